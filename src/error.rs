//! Top-level application errors surfaced by the binary.

use thiserror::Error;

use crate::config::LoadError;
use crate::settings::StoreError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] LoadError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("settings store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
