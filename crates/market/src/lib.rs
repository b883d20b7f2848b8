//! Parley marketplace core.
//!
//! Users post text queries with a bid, other users answer them with
//! responses validated against the query's regex, and a per-user ledger moves
//! the bid from requester to responder. Money enters and leaves through a
//! [`PaymentGateway`].
//!
//! The crate is storage-agnostic: [`Market`] works against any
//! [`parley_storage::MarketStorage`] backend.

pub mod config;
pub mod error;
pub mod fees;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod operation;
pub mod pool;

pub use config::{GatewayConfig, MarketConfig, NotifyConfig, DEFAULT_REGEX};
pub use error::MarketError;
pub use fees::FeeSchedule;
pub use gateway::{
    GatewayAction, GatewayError, GatewayReceipt, GatewayRequest, HttpGateway, PaymentGateway,
    SandboxGateway,
};
pub use ledger::{Balance, LedgerAudit};
pub use lifecycle::QueryState;
pub use market::Market;
pub use metrics::{MarketMetrics, MetricsSnapshot};
pub use notify::{CallbackTransport, HttpCallbackTransport, NotifyError, ResponseNotification};
pub use operation::{
    AttributeInput, AttributeKey, DepositRequest, MoneyEventListing, MoneyMovement, NewQuery,
    NewRating, NewResponse, Operation, Outcome, PayoutAccount, ProfileView, QueryListing,
    WithdrawRequest,
};
pub use pool::PoolFilter;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current UTC time as RFC 3339.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}

/// Fresh UUID v4, hyphenated.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
