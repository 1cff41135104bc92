//! Hook bus and event binding.
//!
//! Host content-editing events are identified by string hooks. At process
//! start the watched set is re-validated against the action catalog and the
//! flush routine is attached to every surviving hook, plus the per-content-
//! type "saved via API" family. Emitting an unbound hook is a logged no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::ActionCatalog;
use crate::flush::{Flusher, RequestContext};
use crate::lock::{rw_read, rw_write};

/// One fired hook, with an identity for log correlation.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub id: Uuid,
    pub hook: String,
    pub timestamp: OffsetDateTime,
}

impl HookEvent {
    fn fire(hook: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            hook: hook.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// A listener attached to one or more hooks.
#[async_trait]
pub trait HookListener: Send + Sync {
    async fn handle(&self, event: &HookEvent, ctx: &mut RequestContext);
}

#[async_trait]
impl HookListener for Flusher {
    async fn handle(&self, event: &HookEvent, ctx: &mut RequestContext) {
        debug!(event_id = %event.id, hook = %event.hook, "Hook fired; flushing permalinks");
        self.flush(ctx).await;
    }
}

/// Identifier → listeners registry.
///
/// Registration happens once per process start; emission clones the
/// listener list out of the lock before awaiting anything.
pub struct HookBus {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn HookListener>>>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, hook: &str, listener: Arc<dyn HookListener>) {
        rw_write(&self.listeners, "subscribe")
            .entry(hook.to_string())
            .or_default()
            .push(listener);
    }

    pub fn unbind(&self, hook: &str) {
        rw_write(&self.listeners, "unbind").remove(hook);
    }

    pub fn is_bound(&self, hook: &str) -> bool {
        rw_read(&self.listeners, "is_bound").contains_key(hook)
    }

    /// Bound hook identifiers, sorted for stable presentation.
    pub fn bound_hooks(&self) -> Vec<String> {
        let mut hooks: Vec<String> = rw_read(&self.listeners, "bound_hooks")
            .keys()
            .cloned()
            .collect();
        hooks.sort();
        hooks
    }

    /// Run every listener bound to `hook` against one request context.
    ///
    /// Returns the number of listeners notified; zero for unbound hooks.
    pub async fn emit(&self, hook: &str, ctx: &mut RequestContext) -> usize {
        let listeners: Vec<Arc<dyn HookListener>> = rw_read(&self.listeners, "emit")
            .get(hook)
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            debug!(hook, "No listeners bound for hook");
            return 0;
        }

        let event = HookEvent::fire(hook);
        for listener in &listeners {
            listener.handle(&event, ctx).await;
        }
        listeners.len()
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach the flush routine to every watched event still present in the
/// catalog. Stale identifiers are dropped, not errors.
///
/// Returns the number of hooks bound.
pub fn bind_watched_events(
    bus: &HookBus,
    watched: &[String],
    catalog: &ActionCatalog,
    flusher: Arc<Flusher>,
) -> usize {
    let mut bound = 0;
    for hook in watched {
        if catalog.contains(hook) {
            bus.subscribe(hook, flusher.clone());
            bound += 1;
        } else {
            debug!(hook = %hook, "Watched event no longer in catalog; not binding");
        }
    }
    info!(bound, watched = watched.len(), "Watched events bound");
    bound
}

/// Replace the catalog-event bindings with a new watched set.
///
/// Settings updates change the watched set while the process runs, so the
/// bus must follow without a restart. Only hooks the catalog knows are
/// cleared; API-save bindings are independent of the watched set and stay.
///
/// Returns the number of hooks bound.
pub fn rebind_watched_events(
    bus: &HookBus,
    watched: &[String],
    catalog: &ActionCatalog,
    flusher: Arc<Flusher>,
) -> usize {
    for id in catalog.ids() {
        bus.unbind(id);
    }
    bind_watched_events(bus, watched, catalog, flusher)
}

/// The hook fired when a record of `content_type` is saved through the
/// host's editor API.
pub fn api_save_hook(content_type: &str) -> String {
    format!("api_saved_{content_type}")
}

/// Attach the flush routine to the API-save hook of every publicly visible
/// content type, including custom ones absent from the catalog. Independent
/// of the watched set.
pub fn bind_api_saves(bus: &HookBus, content_types: &[String], flusher: Arc<Flusher>) {
    for content_type in content_types {
        bus.subscribe(&api_save_hook(content_type), flusher.clone());
    }
    info!(
        content_types = content_types.len(),
        "API-save hooks bound for registered content types"
    );
}
