use serde::{Deserialize, Serialize};

/// Table names used in [`StorageError`](crate::StorageError) variants.
pub mod table {
    pub const PROFILES: &str = "profiles";
    pub const QUERIES: &str = "queries";
    pub const RESPONSES: &str = "responses";
    pub const RATINGS: &str = "ratings";
    pub const MONEY_EVENTS: &str = "money_events";
    pub const ATTRIBUTES: &str = "attributes";
}

/// A user's ledger row. One per registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: String,
    /// Settled balance in minor currency units.
    pub balance: u64,
    /// Portion of `balance` earmarked for an in-flight outbound gateway call.
    pub reserved: u64,
    /// Gateway destination account for transfers and payouts.
    pub payout_account: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

impl ProfileRecord {
    /// Balance that may be spent or withdrawn right now.
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.reserved)
    }
}

/// A posted question awaiting a matching response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub owner_id: String,
    pub text: String,
    pub regex: String,
    pub bid: u64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    pub retrieval_count: u64,
    pub last_retrieved_at: Option<String>,
    pub callback_url: Option<String>,
    /// Set once the query has been answered. None means the query is open.
    pub response_id: Option<String>,
}

impl QueryRecord {
    pub fn is_open(&self) -> bool {
        self.response_id.is_none()
    }
}

/// The answer to exactly one query. `query_id` is unique across responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub owner_id: String,
    pub query_id: String,
    pub text: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// The query owner's verdict on a response. `response_id` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub id: String,
    pub response_id: String,
    pub rater_id: String,
    pub satisfactory: bool,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Kind of a ledger-affecting money event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyEventKind {
    Deposit,
    Payout,
    Transfer,
    Bid,
    Earning,
}

impl MoneyEventKind {
    /// Whether an event of this kind adds to the user's balance.
    pub fn is_credit(self) -> bool {
        matches!(self, MoneyEventKind::Deposit | MoneyEventKind::Earning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoneyEventKind::Deposit => "deposit",
            MoneyEventKind::Payout => "payout",
            MoneyEventKind::Transfer => "transfer",
            MoneyEventKind::Bid => "bid",
            MoneyEventKind::Earning => "earning",
        }
    }
}

/// An append-only record of funds moving into, out of, or within the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyEventRecord {
    pub id: String,
    pub user_id: String,
    pub kind: MoneyEventKind,
    pub amount: u64,
    /// Gateway transaction id. Present for deposit, payout and transfer.
    pub external_ref: Option<String>,
    /// Query the event belongs to. Present for bid and earning.
    pub query_id: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

impl MoneyEventRecord {
    /// Signed contribution of this event to the owner's balance.
    pub fn signed_amount(&self) -> i128 {
        if self.kind.is_credit() {
            self.amount as i128
        } else {
            -(self.amount as i128)
        }
    }
}

/// A free-form key/value pair attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: String,
    pub user_id: String,
    pub key: String,
    pub value: String,
}

/// Filter for listing queries.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub owner_id: Option<String>,
    /// `Some(true)` lists only open queries, `Some(false)` only answered ones.
    pub open: Option<bool>,
    pub min_bid: Option<u64>,
}

impl QueryFilter {
    pub fn open() -> Self {
        Self {
            open: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, query: &QueryRecord) -> bool {
        if let Some(owner) = &self.owner_id {
            if &query.owner_id != owner {
                return false;
            }
        }
        if let Some(open) = self.open {
            if query.is_open() != open {
                return false;
            }
        }
        if let Some(min_bid) = self.min_bid {
            if query.bid < min_bid {
                return false;
            }
        }
        true
    }
}
