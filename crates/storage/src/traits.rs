use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    AttributeRecord, MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryFilter, QueryRecord,
    RatingRecord, ResponseRecord,
};

/// The storage trait for Parley market backends.
///
/// A `MarketStorage` implementation provides durable, transactional storage
/// for profiles, queries, responses, ratings, money events and attributes.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call `*_for_update` readers and mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// ## Row Exclusivity
///
/// Rows returned by a `*_for_update` method stay locked until the snapshot
/// ends (`SELECT ... FOR UPDATE` semantics). Two snapshots can therefore
/// never both observe an open query and both attach a response to it, and
/// two debits against one profile never both pass a balance check against
/// a stale balance.
///
/// ## Uniqueness
///
/// `insert_response` enforces `UNIQUE(query_id)` and `insert_rating`
/// enforces `UNIQUE(response_id)`, returning
/// `StorageError::UniqueViolation` on a duplicate.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries. Reads outside a
/// snapshot observe committed data only and must not wait on open snapshots.
#[async_trait]
pub trait MarketStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Profiles (within snapshot) ────────────────────────────────────────────

    /// Insert a new profile. `AlreadyExists` if the user already has one.
    async fn insert_profile(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError>;

    /// Read a profile, locking the row for update.
    async fn get_profile_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        user_id: &str,
    ) -> Result<ProfileRecord, StorageError>;

    /// Overwrite an existing profile. `NotFound` if it does not exist.
    async fn update_profile(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError>;

    // ── Queries and responses (within snapshot) ───────────────────────────────

    async fn insert_query(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError>;

    /// Read a query, locking the row for update.
    async fn get_query_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        query_id: &str,
    ) -> Result<QueryRecord, StorageError>;

    /// List queries matching `filter`, locking every returned row.
    async fn list_queries_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        filter: &QueryFilter,
    ) -> Result<Vec<QueryRecord>, StorageError>;

    /// Overwrite an existing query. `NotFound` if it does not exist.
    async fn update_query(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError>;

    /// Insert a response. `UniqueViolation` if the query already has one.
    async fn insert_response(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ResponseRecord,
    ) -> Result<(), StorageError>;

    /// Read a response, locking the row for update.
    async fn get_response_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        response_id: &str,
    ) -> Result<ResponseRecord, StorageError>;

    /// Insert a rating. `UniqueViolation` if the response is already rated.
    async fn insert_rating(
        &self,
        snapshot: &mut Self::Snapshot,
        record: RatingRecord,
    ) -> Result<(), StorageError>;

    // ── Ledger and attributes (within snapshot) ───────────────────────────────

    /// Append a money event. Events are never updated or deleted.
    async fn insert_money_event(
        &self,
        snapshot: &mut Self::Snapshot,
        record: MoneyEventRecord,
    ) -> Result<(), StorageError>;

    /// Insert an attribute, or overwrite the value of the existing
    /// `(user_id, key)` attribute. Returns the stored record.
    async fn upsert_attribute(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AttributeRecord,
    ) -> Result<AttributeRecord, StorageError>;

    /// Delete the `(user_id, key)` attribute. `NotFound` if absent.
    async fn delete_attribute(
        &self,
        snapshot: &mut Self::Snapshot,
        user_id: &str,
        key: &str,
    ) -> Result<(), StorageError>;

    // ── Reads (outside snapshot, committed data only) ─────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<ProfileRecord, StorageError>;

    async fn get_query(&self, query_id: &str) -> Result<QueryRecord, StorageError>;

    async fn get_response(&self, response_id: &str) -> Result<ResponseRecord, StorageError>;

    /// Rating attached to a response, if any.
    async fn get_rating_for_response(
        &self,
        response_id: &str,
    ) -> Result<Option<RatingRecord>, StorageError>;

    /// List queries matching `filter`, oldest first.
    async fn list_queries(&self, filter: &QueryFilter) -> Result<Vec<QueryRecord>, StorageError>;

    /// List responses, optionally restricted to one owner, oldest first.
    async fn list_responses(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<ResponseRecord>, StorageError>;

    /// List a user's money events in insertion order.
    async fn list_money_events(
        &self,
        user_id: &str,
        kind: Option<MoneyEventKind>,
    ) -> Result<Vec<MoneyEventRecord>, StorageError>;

    /// List a user's attributes ordered by key.
    async fn list_attributes(&self, user_id: &str) -> Result<Vec<AttributeRecord>, StorageError>;
}
