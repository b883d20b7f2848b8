use parley_storage::StorageError;

use crate::gateway::GatewayError;

/// Errors returned by market operations.
///
/// Validation failures (`RegexMismatch`, `AmountTooSmall`,
/// `InsufficientBalance`, ...) are rejected operations and are never retried
/// by the market. `Gateway` failures leave local state untouched, so the whole
/// operation may be retried by the caller.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("insufficient balance for {user_id}: required {required}, available {available}")]
    InsufficientBalance {
        user_id: String,
        required: u64,
        available: u64,
    },

    /// No open query is currently eligible. Callers should try again later.
    #[error("no open query available")]
    PoolEmpty,

    /// Another response was accepted first. An expected race outcome.
    #[error("query {query_id} has already been answered")]
    AlreadyAnswered { query_id: String },

    #[error("response {response_id} has already been rated")]
    AlreadyRated { response_id: String },

    #[error("response text '{text}' does not match query regex r'{pattern}'")]
    RegexMismatch { text: String, pattern: String },

    #[error("invalid regex r'{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("amount {amount} too small: {reason}")]
    AmountTooSmall { amount: u64, reason: String },

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("user {user_id} is already registered")]
    AlreadyRegistered { user_id: String },

    #[error("user {user_id} does not own query {query_id}")]
    NotQueryOwner { user_id: String, query_id: String },

    #[error("user {user_id} has no payout account registered")]
    PayoutAccountMissing { user_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl MarketError {
    /// Stable snake_case identifier, used in HTTP bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::InsufficientBalance { .. } => "insufficient_balance",
            MarketError::PoolEmpty => "pool_empty",
            MarketError::AlreadyAnswered { .. } => "already_answered",
            MarketError::AlreadyRated { .. } => "already_rated",
            MarketError::RegexMismatch { .. } => "regex_mismatch",
            MarketError::InvalidRegex { .. } => "invalid_regex",
            MarketError::AmountTooSmall { .. } => "amount_too_small",
            MarketError::Gateway(_) => "gateway_error",
            MarketError::NotFound { .. } => "not_found",
            MarketError::AlreadyRegistered { .. } => "already_registered",
            MarketError::NotQueryOwner { .. } => "not_query_owner",
            MarketError::PayoutAccountMissing { .. } => "payout_account_missing",
            MarketError::InvalidInput(_) => "invalid_input",
            MarketError::Storage(_) => "storage_error",
        }
    }

    /// True for the losing side of a concurrent answer race. These are a
    /// normal outcome and are logged and counted separately from faults.
    pub fn is_race_loss(&self) -> bool {
        matches!(self, MarketError::AlreadyAnswered { .. })
    }
}

impl From<StorageError> for MarketError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { table, id } => MarketError::NotFound {
                kind: singular(table),
                id,
            },
            other => MarketError::Storage(other),
        }
    }
}

fn singular(table: &'static str) -> &'static str {
    match table {
        "profiles" => "profile",
        "queries" => "query",
        "responses" => "response",
        "ratings" => "rating",
        "money_events" => "money event",
        "attributes" => "attribute",
        other => other,
    }
}
