//! Permalink auto-flush sidecar for a CMS host.
//!
//! Watches content-editing events delivered by the host, asks the host to
//! recompute its permalink rewrite rules when one fires, and keeps a
//! recurring flush schedule as a safety net. Settings are persisted to a
//! small TOML state file and exposed over an admin HTTP API.

pub mod catalog;
pub mod config;
pub mod error;
pub mod flush;
pub mod hooks;
pub mod http;
pub mod rewrite;
pub mod scheduler;
pub mod settings;
pub mod telemetry;

pub(crate) mod lock;
