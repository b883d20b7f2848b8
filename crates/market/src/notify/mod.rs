//! Best-effort response callbacks.
//!
//! When a response is accepted for a query that carries a callback URL, the
//! market hands a [`ResponseNotification`] to the [`Notifier`]. Dispatch only
//! enqueues; a background worker performs delivery through a
//! [`CallbackTransport`]. Delivery failures are logged and counted in
//! [`MarketMetrics`] and never reach the caller that created the response.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use http::HttpCallbackTransport;

use crate::metrics::MarketMetrics;

/// Payload POSTed to a query's callback URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseNotification {
    pub query_id: String,
    pub response_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid callback url '{0}'")]
    InvalidUrl(String),
    #[error("callback returned HTTP {0}")]
    Status(u16),
    #[error("callback transport failure: {0}")]
    Transport(String),
}

/// Delivers one notification. Implementations must not retry.
#[async_trait]
pub trait CallbackTransport: Send + Sync + 'static {
    async fn post(&self, url: &str, payload: &ResponseNotification) -> Result<(), NotifyError>;
}

struct CallbackJob {
    url: String,
    payload: ResponseNotification,
}

/// Handle to the callback queue. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<CallbackJob>,
    metrics: Arc<MarketMetrics>,
}

impl Notifier {
    /// Start the delivery worker on the current tokio runtime.
    ///
    /// The worker exits once every `Notifier` clone has been dropped and the
    /// queue has drained.
    pub fn spawn<T: CallbackTransport>(transport: T, metrics: Arc<MarketMetrics>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CallbackJob>();
        let worker_metrics = metrics.clone();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                match transport.post(&job.url, &job.payload).await {
                    Ok(()) => {
                        tracing::debug!(
                            url = %job.url,
                            query_id = %job.payload.query_id,
                            "callback delivered"
                        );
                        worker_metrics.notification_finished(true);
                    }
                    Err(e) => {
                        tracing::warn!(
                            url = %job.url,
                            query_id = %job.payload.query_id,
                            error = %e,
                            "callback delivery failed"
                        );
                        worker_metrics.notification_finished(false);
                    }
                }
            }
        });

        Notifier { sender, metrics }
    }

    /// Enqueue a callback. Never blocks and never fails.
    pub fn dispatch(&self, url: String, payload: ResponseNotification) {
        self.metrics.notification_queued();
        if self.sender.send(CallbackJob { url, payload }).is_err() {
            tracing::warn!("callback worker has stopped; notification dropped");
            self.metrics.notification_finished(false);
        }
    }

    /// Wait until the queue is empty, polling every few milliseconds.
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.metrics.snapshot().notifications_pending > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}
