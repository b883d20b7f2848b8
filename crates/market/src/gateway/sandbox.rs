//! Test-mode payment gateway.
//!
//! Accepts every well-formed request and mints `sbx_<action>_<uuid>`
//! transaction ids without moving real money. Replays the original receipt
//! when an idempotency key is reused, like a real processor does. Can be
//! told to decline large amounts, to go offline, or to lose its replies
//! after executing, which the market test suites use to exercise
//! gateway-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{GatewayAction, GatewayError, GatewayReceipt, GatewayRequest, PaymentGateway};

/// One call observed by the sandbox, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCall {
    pub action: GatewayAction,
    pub request: GatewayRequest,
    pub external_id: Option<String>,
}

#[derive(Default)]
struct SandboxBook {
    calls: Vec<SandboxCall>,
    receipts: HashMap<String, GatewayReceipt>,
}

#[derive(Default)]
pub struct SandboxGateway {
    decline_above: Option<u64>,
    offline: AtomicBool,
    lose_replies: AtomicBool,
    book: Mutex<SandboxBook>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decline (HTTP 402) any request whose amount exceeds `limit`.
    pub fn decline_above(limit: u64) -> Self {
        Self {
            decline_above: Some(limit),
            ..Self::default()
        }
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While set, calls execute and mint receipts but the caller only sees
    /// a transport error, as when a reply times out in flight.
    pub fn set_lose_replies(&self, lose: bool) {
        self.lose_replies.store(lose, Ordering::SeqCst);
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<SandboxCall> {
        self.book.lock().await.calls.clone()
    }

    async fn process(
        &self,
        action: GatewayAction,
        request: GatewayRequest,
    ) -> Result<GatewayReceipt, GatewayError> {
        let mut book = self.book.lock().await;

        let outcome = if self.offline.load(Ordering::SeqCst) {
            Err(GatewayError::Transport {
                action,
                message: "sandbox is offline".to_string(),
            })
        } else if let Some(receipt) = book.receipts.get(&request.idempotency_key) {
            Ok(receipt.clone())
        } else if request.amount == 0 {
            Err(GatewayError::Declined {
                action,
                status: 400,
                message: "amount must be positive".to_string(),
            })
        } else if self.decline_above.is_some_and(|limit| request.amount > limit) {
            Err(GatewayError::Declined {
                action,
                status: 402,
                message: format!("amount {} exceeds sandbox limit", request.amount),
            })
        } else {
            let receipt = GatewayReceipt {
                external_id: format!("sbx_{}_{}", action, uuid::Uuid::new_v4().simple()),
            };
            book.receipts
                .insert(request.idempotency_key.clone(), receipt.clone());
            Ok(receipt)
        };

        book.calls.push(SandboxCall {
            action,
            request,
            external_id: outcome.as_ref().ok().map(|r| r.external_id.clone()),
        });
        if outcome.is_ok() && self.lose_replies.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport {
                action,
                message: "sandbox reply lost".to_string(),
            });
        }
        outcome
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.process(GatewayAction::Charge, request).await
    }

    async fn transfer(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.process(GatewayAction::Transfer, request).await
    }

    async fn payout(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        self.process(GatewayAction::Payout, request).await
    }

    fn gateway_id(&self) -> &str {
        "sandbox"
    }
}
