//! HTTP adapter for the host's rewrite-rule recomputation endpoint.

use async_trait::async_trait;
use tracing::debug;

use crate::flush::{RewriteError, RewriteRules};

/// Recomputes rewrite rules by POSTing to an endpoint exposed by the host.
///
/// The host owns the actual rule store; this adapter only asks it to
/// rebuild and reports whether it agreed.
pub struct HttpRewriteRules {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRewriteRules {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RewriteRules for HttpRewriteRules {
    async fn recompute(&self) -> Result<(), RewriteError> {
        debug!(endpoint = %self.endpoint, "Requesting rewrite recomputation");
        let response = self
            .client
            .post(&self.endpoint)
            .send()
            .await
            .map_err(|err| RewriteError::new(format!("flush request failed: {err}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RewriteError::new(format!(
                "host answered {} to flush request",
                response.status()
            )))
        }
    }
}
