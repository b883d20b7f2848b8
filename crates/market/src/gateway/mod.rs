//! Payment gateway abstraction.
//!
//! The market never talks to a payment processor directly. It consumes a
//! [`PaymentGateway`] capability injected at construction, and only persists
//! a money event once the gateway has returned a transaction id.
//!
//! Implementations:
//! - [`HttpGateway`]: JSON-over-HTTP processor API
//! - [`SandboxGateway`]: local test-mode processor

pub mod http;
pub mod sandbox;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpGateway;
pub use sandbox::SandboxGateway;

/// Which kind of gateway call is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayAction {
    /// Pull funds from a payment source into the market.
    Charge,
    /// Move market funds to a user's connected account.
    Transfer,
    /// Send funds from the market out to a user's bank destination.
    Payout,
}

impl GatewayAction {
    /// Resource path segment for the HTTP API.
    pub fn resource(self) -> &'static str {
        match self {
            GatewayAction::Charge => "charges",
            GatewayAction::Transfer => "transfers",
            GatewayAction::Payout => "payouts",
        }
    }
}

impl fmt::Display for GatewayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayAction::Charge => "charge",
            GatewayAction::Transfer => "transfer",
            GatewayAction::Payout => "payout",
        };
        f.write_str(name)
    }
}

/// A single outbound money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Amount in minor currency units. Always positive.
    pub amount: u64,
    pub currency: String,
    /// Payment source token for charges, destination account otherwise.
    pub counterparty: String,
    /// Sent with the request so a retried call is never executed twice.
    pub idempotency_key: String,
}

/// Successful gateway response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    /// The processor's transaction id.
    pub external_id: String,
}

/// Errors reported by a payment gateway. Never retried by the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The processor answered and refused the request.
    #[error("{action} declined ({status}): {message}")]
    Declined {
        action: GatewayAction,
        status: u16,
        message: String,
    },

    /// The request never got a definitive answer (network, timeout, ...).
    #[error("{action} transport failure: {message}")]
    Transport {
        action: GatewayAction,
        message: String,
    },

    /// The processor answered with something that is not a receipt.
    #[error("{action} returned an invalid response: {message}")]
    InvalidResponse {
        action: GatewayAction,
        message: String,
    },

    #[error("gateway not configured: {0}")]
    NotConfigured(String),
}

/// Synchronous money-movement RPC against an external processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `counterparty` (a payment source token) and move the funds
    /// into the market.
    async fn charge(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError>;

    /// Move market funds to the `counterparty` connected account.
    async fn transfer(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError>;

    /// Pay funds out to the `counterparty` destination.
    async fn payout(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError>;

    /// Short identifier for logs (e.g. `"http"`, `"sandbox"`).
    fn gateway_id(&self) -> &str;

    /// Dispatch by action.
    async fn execute(
        &self,
        action: GatewayAction,
        request: GatewayRequest,
    ) -> Result<GatewayReceipt, GatewayError> {
        match action {
            GatewayAction::Charge => self.charge(request).await,
            GatewayAction::Transfer => self.transfer(request).await,
            GatewayAction::Payout => self.payout(request).await,
        }
    }
}
