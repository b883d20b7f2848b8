//! Typed operation contracts.
//!
//! Every use case the market offers is one [`Operation`] variant carrying its
//! own input type. [`crate::Market::execute`] dispatches on the variant with an
//! exhaustive match and returns the matching [`Outcome`]. The JSON form is
//! internally tagged:
//!
//! ```json
//! {"op": "create_query", "text": "Is it raining?", "regex": "yes|no", "bid": 5}
//! ```

use parley_storage::{
    AttributeRecord, MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryRecord, RatingRecord,
    ResponseRecord,
};
use serde::{Deserialize, Serialize};

use crate::ledger::{Balance, LedgerAudit};
use crate::pool::PoolFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    RegisterUser,
    GetProfile,
    RegisterPayoutAccount(PayoutAccount),
    CreateQuery(NewQuery),
    ServeQuery(PoolFilter),
    CreateResponse(NewResponse),
    CreateRating(NewRating),
    Deposit(DepositRequest),
    Transfer(WithdrawRequest),
    Payout(WithdrawRequest),
    ListQueries(QueryListing),
    ListResponses,
    ListMoneyEvents(MoneyEventListing),
    SetAttribute(AttributeInput),
    ListAttributes,
    DeleteAttribute(AttributeKey),
    AuditBalance,
}

impl Operation {
    /// The `op` tag, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RegisterUser => "register_user",
            Operation::GetProfile => "get_profile",
            Operation::RegisterPayoutAccount(_) => "register_payout_account",
            Operation::CreateQuery(_) => "create_query",
            Operation::ServeQuery(_) => "serve_query",
            Operation::CreateResponse(_) => "create_response",
            Operation::CreateRating(_) => "create_rating",
            Operation::Deposit(_) => "deposit",
            Operation::Transfer(_) => "transfer",
            Operation::Payout(_) => "payout",
            Operation::ListQueries(_) => "list_queries",
            Operation::ListResponses => "list_responses",
            Operation::ListMoneyEvents(_) => "list_money_events",
            Operation::SetAttribute(_) => "set_attribute",
            Operation::ListAttributes => "list_attributes",
            Operation::DeleteAttribute(_) => "delete_attribute",
            Operation::AuditBalance => "audit_balance",
        }
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    /// Destination account id at the payment processor.
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuery {
    pub text: String,
    /// Pattern a response must fully match. Defaults to any text.
    #[serde(default)]
    pub regex: Option<String>,
    /// Reward paid to the accepted responder. Defaults to the configured
    /// `default_bid`.
    #[serde(default)]
    pub bid: Option<u64>,
    /// Receives a POST when the query is answered.
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResponse {
    pub query_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRating {
    pub response_id: String,
    pub satisfactory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Gross amount charged to the payment source, fees included.
    pub amount: u64,
    /// Payment source token issued by the processor's client library.
    pub source_token: String,
    /// Reuse the key from a failed attempt to retry it without charging twice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Body of a transfer or payout.
///
/// A gateway timeout does not prove the processor never executed the call.
/// Retrying with the same `idempotency_key` lets the processor replay the
/// original result instead of moving the money again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl WithdrawRequest {
    pub fn new(amount: u64) -> Self {
        WithdrawRequest {
            amount,
            idempotency_key: None,
        }
    }

    pub fn keyed(amount: u64, idempotency_key: impl Into<String>) -> Self {
        WithdrawRequest {
            amount,
            idempotency_key: Some(idempotency_key.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryListing {
    /// `Some(true)` for open queries only, `Some(false)` for answered only.
    pub open: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyEventListing {
    pub kind: Option<MoneyEventKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKey {
    pub key: String,
}

// ── Outcomes ──────────────────────────────────────────────────────────────

/// A profile together with its derived balance figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileView {
    pub user_id: String,
    pub balance: u64,
    pub reserved: u64,
    pub available: u64,
    pub payout_account: Option<String>,
    pub created_at: String,
}

impl From<ProfileRecord> for ProfileView {
    fn from(profile: ProfileRecord) -> Self {
        ProfileView {
            available: profile.available(),
            user_id: profile.user_id,
            balance: profile.balance,
            reserved: profile.reserved,
            payout_account: profile.payout_account,
            created_at: profile.created_at,
        }
    }
}

/// A completed gateway-backed money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyMovement {
    pub kind: MoneyEventKind,
    /// Amount sent to or charged at the gateway.
    pub gross_amount: u64,
    /// Fees withheld. Zero for transfers and payouts.
    pub fees: u64,
    /// Amount posted to the ledger.
    pub amount: u64,
    pub external_ref: String,
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum Outcome {
    Profile(ProfileView),
    Query(QueryRecord),
    Response(ResponseRecord),
    Rating(RatingRecord),
    Money(MoneyMovement),
    Queries(Vec<QueryRecord>),
    Responses(Vec<ResponseRecord>),
    MoneyEvents(Vec<MoneyEventRecord>),
    Attribute(AttributeRecord),
    Attributes(Vec<AttributeRecord>),
    Deleted(AttributeKey),
    Audit(LedgerAudit),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_parse_from_tagged_json() {
        let op: Operation = serde_json::from_value(json!({
            "op": "create_query",
            "text": "Is it raining?",
            "regex": "yes|no",
            "bid": 5
        }))
        .unwrap();
        assert_eq!(
            op,
            Operation::CreateQuery(NewQuery {
                text: "Is it raining?".to_string(),
                regex: Some("yes|no".to_string()),
                bid: Some(5),
                callback_url: None,
            })
        );
        assert_eq!(op.name(), "create_query");
    }

    #[test]
    fn optional_inputs_default() {
        let serve: Operation = serde_json::from_value(json!({"op": "serve_query"})).unwrap();
        assert_eq!(serve, Operation::ServeQuery(PoolFilter::default()));

        let listing: Operation =
            serde_json::from_value(json!({"op": "list_money_events", "kind": "earning"})).unwrap();
        assert_eq!(
            listing,
            Operation::ListMoneyEvents(MoneyEventListing {
                kind: Some(MoneyEventKind::Earning)
            })
        );

        let audit: Operation = serde_json::from_value(json!({"op": "audit_balance"})).unwrap();
        assert_eq!(audit, Operation::AuditBalance);
    }

    #[test]
    fn unknown_op_rejected() {
        let result: Result<Operation, _> = serde_json::from_value(json!({"op": "mint_money"}));
        assert!(result.is_err());
    }

    #[test]
    fn outcome_is_adjacently_tagged() {
        let outcome = Outcome::Deleted(AttributeKey {
            key: "lang".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"outcome": "deleted", "result": {"key": "lang"}})
        );
    }
}
