//! The flush routine.
//!
//! Wraps the host's rewrite-rule recomputation primitive with the
//! once-per-request guard. Failures are logged and swallowed; nothing here
//! propagates to listeners or the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

/// The host primitive rejected or failed the recomputation.
#[derive(Debug, Error)]
#[error("rewrite recomputation failed: {message}")]
pub struct RewriteError {
    message: String,
}

impl RewriteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The host's "force full rewrite-rule recomputation" primitive.
///
/// Expensive and synchronous from the host's point of view; treated as
/// opaque here. An `Err` is the primitive's boolean failure indicator.
#[async_trait]
pub trait RewriteRules: Send + Sync {
    async fn recompute(&self) -> Result<(), RewriteError>;
}

/// Per-request execution context.
///
/// Carries the "already flushed" flag explicitly instead of a process
/// global; one context lives exactly as long as one incoming request or one
/// scheduler fire.
#[derive(Debug, Default)]
pub struct RequestContext {
    flushed: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_flushed(&self) -> bool {
        self.flushed
    }
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The primitive ran and reported success.
    Completed,
    /// The guard was already set; nothing was re-executed.
    AlreadyFlushed,
    /// The primitive reported failure; logged, not retried.
    Failed,
}

impl FlushOutcome {
    /// Guard hits count as success: the rules were already recomputed
    /// within this request.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Invokes the recomputation primitive at most once per request context.
pub struct Flusher {
    rules: Arc<dyn RewriteRules>,
}

impl Flusher {
    pub fn new(rules: Arc<dyn RewriteRules>) -> Self {
        Self { rules }
    }

    pub async fn flush(&self, ctx: &mut RequestContext) -> FlushOutcome {
        if ctx.flushed {
            counter!("permaflush_flush_skipped_total").increment(1);
            debug!("Flush already performed in this request; skipping");
            return FlushOutcome::AlreadyFlushed;
        }

        // Guard is set before the primitive runs, so a listener firing
        // mid-recomputation still sees it.
        ctx.flushed = true;

        match self.rules.recompute().await {
            Ok(()) => {
                counter!("permaflush_flush_success_total").increment(1);
                debug!("Permalinks flushed");
                FlushOutcome::Completed
            }
            Err(err) => {
                counter!("permaflush_flush_failure_total").increment(1);
                warn!(error = %err, "Permalink flush failed; rules stay stale until the next trigger");
                FlushOutcome::Failed
            }
        }
    }
}
