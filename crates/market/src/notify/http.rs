//! HTTP callback transport.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking`. The callback
//! receiver's response body is ignored; only the status matters for metrics.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{CallbackTransport, NotifyError, ResponseNotification};

pub struct HttpCallbackTransport {
    timeout: Duration,
}

impl HttpCallbackTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Only absolute http(s) URLs with a host are posted to.
    pub fn validate_url(raw: &str) -> Result<Url, NotifyError> {
        let invalid = || NotifyError::InvalidUrl(raw.to_string());
        let url = Url::parse(raw).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }
        Ok(url)
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn post(&self, url: &str, payload: &ResponseNotification) -> Result<(), NotifyError> {
        let url = Self::validate_url(url)?.to_string();
        let body = serde_json::to_value(payload)
            .map_err(|e| NotifyError::Transport(format!("serialize payload: {e}")))?;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent: ureq::Agent = config.into();
            agent
                .post(&url)
                .send_json(&body)
                .map(|_| ())
                .map_err(|e| match e {
                    ureq::Error::StatusCode(status) => NotifyError::Status(status),
                    other => NotifyError::Transport(other.to_string()),
                })
        })
        .await
        .map_err(|e| NotifyError::Transport(format!("task join error: {}", e)))?
    }
}
