//! HTTP payment gateway.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Every call is a JSON `POST` to
//! `{base_url}/{charges|transfers|payouts}` carrying a bearer API key and an
//! `Idempotency-Key` header; the processor answers `{"id": "..."}`.

use std::time::Duration;

use async_trait::async_trait;

use super::{GatewayAction, GatewayError, GatewayReceipt, GatewayRequest, PaymentGateway};
use crate::config::GatewayConfig;

/// Gateway backed by a remote processor's REST API.
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpGateway {
    /// Build a gateway from injected configuration.
    ///
    /// Both `base_url` and `api_key` are required.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::NotConfigured("gateway.base_url is not set".into()))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::NotConfigured("gateway.api_key is not set".into()))?;
        Ok(HttpGateway {
            base_url,
            api_key,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    /// `https://pay.example/v1/` + Transfer → `https://pay.example/v1/transfers`
    pub fn endpoint(base_url: &str, action: GatewayAction) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), action.resource())
    }

    /// JSON body for a request. Charges name the counterparty `source`,
    /// outbound calls name it `destination`.
    pub fn request_body(action: GatewayAction, request: &GatewayRequest) -> serde_json::Value {
        let counterparty_field = match action {
            GatewayAction::Charge => "source",
            GatewayAction::Transfer | GatewayAction::Payout => "destination",
        };
        let mut body = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency,
        });
        body[counterparty_field] = serde_json::Value::String(request.counterparty.clone());
        body
    }

    pub fn parse_receipt(
        action: GatewayAction,
        value: &serde_json::Value,
    ) -> Result<GatewayReceipt, GatewayError> {
        value
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .map(|id| GatewayReceipt {
                external_id: id.to_string(),
            })
            .ok_or_else(|| GatewayError::InvalidResponse {
                action,
                message: "missing transaction id".to_string(),
            })
    }

    async fn post(
        &self,
        action: GatewayAction,
        request: GatewayRequest,
    ) -> Result<GatewayReceipt, GatewayError> {
        let url = Self::endpoint(&self.base_url, action);
        let body = Self::request_body(action, &request);
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent: ureq::Agent = config.into();

            let response = agent
                .post(&url)
                .header("Authorization", &format!("Bearer {}", api_key))
                .header("Idempotency-Key", &request.idempotency_key)
                .send_json(&body)
                .map_err(|e| match e {
                    ureq::Error::StatusCode(status) => GatewayError::Declined {
                        action,
                        status,
                        message: format!("processor returned HTTP {status}"),
                    },
                    other => GatewayError::Transport {
                        action,
                        message: other.to_string(),
                    },
                })?;

            let value: serde_json::Value =
                response
                    .into_body()
                    .read_json()
                    .map_err(|e| GatewayError::InvalidResponse {
                        action,
                        message: format!("failed to parse response as JSON: {}", e),
                    })?;

            Self::parse_receipt(action, &value)
        })
        .await
        .map_err(|e| GatewayError::Transport {
            action,
            message: format!("task join error: {}", e),
        })?
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn charge(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.post(GatewayAction::Charge, request).await
    }

    async fn transfer(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.post(GatewayAction::Transfer, request).await
    }

    async fn payout(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.post(GatewayAction::Payout, request).await
    }

    fn gateway_id(&self) -> &str {
        "http"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
