//! Flush settings: the two persisted values and their sanitizers.
//!
//! The store holds a flush interval (minutes) and the set of watched event
//! identifiers. Both round-trip through sanitizers on every write, and the
//! watched set is re-validated against the current action catalog on every
//! read because the catalog grows when companion capabilities appear.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::catalog::{ActionCatalog, Capabilities};

/// Policy default for the flush interval, in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// Persisted flush configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSettings {
    pub interval_minutes: u32,
    pub watched_events: Vec<String>,
}

impl FlushSettings {
    /// Policy defaults: five minutes, every event the catalog currently knows.
    pub fn defaults_for(catalog: &ActionCatalog) -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            watched_events: catalog.ids().map(str::to_string).collect(),
        }
    }

    /// The scheduler period derived from the interval.
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

/// Coerce a raw interval to a positive minute count.
///
/// Zero and negative values fall back to the default; values past the
/// representable range clamp to the maximum. Positive inputs are preserved.
pub fn sanitize_interval(raw: i64) -> u32 {
    if raw < 1 {
        return DEFAULT_INTERVAL_MINUTES;
    }
    u32::try_from(raw).unwrap_or(u32::MAX)
}

/// Filter candidate identifiers down to current catalog members.
///
/// Unknown identifiers are dropped silently; duplicates collapse to the
/// first occurrence; order is preserved.
pub fn sanitize_events(raw: &[String], catalog: &ActionCatalog) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(raw.len());
    for candidate in raw {
        if catalog.contains(candidate) && !kept.iter().any(|seen| seen == candidate) {
            kept.push(candidate.clone());
        }
    }
    kept
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode state file: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Persistence seam for flush settings.
///
/// `load` returns `None` when nothing has been saved yet; callers fall back
/// to policy defaults.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Option<FlushSettings>, StoreError>;
    async fn save(&self, settings: &FlushSettings) -> Result<(), StoreError>;
}

/// TOML state file on disk.
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsStore for TomlSettingsStore {
    async fn load(&self) -> Result<Option<FlushSettings>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Some(toml::from_str(&raw)?))
    }

    async fn save(&self, settings: &FlushSettings) -> Result<(), StoreError> {
        let encoded = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, encoded).await?;
        Ok(())
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateSettingsCommand {
    pub interval_minutes: Option<i64>,
    pub watched_events: Option<Vec<String>>,
}

/// Read/write facade over the settings store.
///
/// Owns the interval-change notification consumed by the scheduler: when an
/// update changes the sanitized interval, the new period is published on a
/// watch channel.
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    capabilities: Capabilities,
    period_tx: watch::Sender<Duration>,
}

impl SettingsService {
    /// Load current state and wire the interval-change channel.
    ///
    /// The receiver starts at the currently effective period so a scheduler
    /// built from it needs no extra read.
    pub async fn connect(
        store: Arc<dyn SettingsStore>,
        capabilities: Capabilities,
    ) -> Result<(Self, watch::Receiver<Duration>), StoreError> {
        let catalog = ActionCatalog::build(&capabilities);
        let current = sanitize_loaded(store.load().await?, &catalog);
        let (period_tx, period_rx) = watch::channel(current.period());
        Ok((
            Self {
                store,
                capabilities,
                period_tx,
            },
            period_rx,
        ))
    }

    /// The catalog as of right now. Computed fresh per call; never cached.
    pub fn catalog(&self) -> ActionCatalog {
        ActionCatalog::build(&self.capabilities)
    }

    /// Current settings, sanitized against the current catalog.
    ///
    /// Re-validation on read is deliberate: an identifier saved while a
    /// capability was active must not survive the capability going away.
    pub async fn load(&self) -> Result<FlushSettings, StoreError> {
        let catalog = self.catalog();
        Ok(sanitize_loaded(self.store.load().await?, &catalog))
    }

    /// Apply a partial update, sanitize, persist, and notify on interval change.
    pub async fn update(
        &self,
        command: UpdateSettingsCommand,
    ) -> Result<FlushSettings, StoreError> {
        let mut current = self.load().await?;
        let previous_interval = current.interval_minutes;

        if let Some(raw) = command.interval_minutes {
            current.interval_minutes = sanitize_interval(raw);
        }
        if let Some(raw) = command.watched_events {
            current.watched_events = sanitize_events(&raw, &self.catalog());
        }

        self.store.save(&current).await?;
        debug!(
            interval_minutes = current.interval_minutes,
            watched = current.watched_events.len(),
            "Flush settings saved"
        );

        if current.interval_minutes != previous_interval {
            info!(
                previous_minutes = previous_interval,
                interval_minutes = current.interval_minutes,
                "Flush interval changed; notifying scheduler"
            );
            let _ = self.period_tx.send(current.period());
        }

        Ok(current)
    }
}

fn sanitize_loaded(stored: Option<FlushSettings>, catalog: &ActionCatalog) -> FlushSettings {
    match stored {
        Some(stored) => FlushSettings {
            interval_minutes: sanitize_interval(i64::from(stored.interval_minutes)),
            watched_events: sanitize_events(&stored.watched_events, catalog),
        },
        None => FlushSettings::defaults_for(catalog),
    }
}
