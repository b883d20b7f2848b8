//! Query pool: random assignment of unanswered queries to responders.
//!
//! Serving a query does not reserve it. Several responders may hold the same
//! query at once; the lifecycle accepts only the first valid response.

use parley_storage::{MarketStorage, QueryFilter, QueryRecord};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::lifecycle::QueryState;
use crate::now_rfc3339;

/// Which open queries a responder is willing to be served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolFilter {
    /// Skip queries bidding less than this.
    pub min_bid: Option<u64>,
    /// Also serve the responder's own queries.
    pub include_own: bool,
}

/// Pick one open query uniformly at random and record the retrieval.
///
/// Runs inside the caller's snapshot so the retrieval counter update is
/// committed together with whatever else the caller does.
pub async fn next_unclaimed<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    for_user: &str,
    filter: &PoolFilter,
) -> Result<QueryRecord, MarketError> {
    let storage_filter = QueryFilter {
        owner_id: None,
        open: Some(true),
        min_bid: filter.min_bid,
    };
    let candidates: Vec<QueryRecord> = storage
        .list_queries_for_update(snapshot, &storage_filter)
        .await?
        .into_iter()
        .filter(|q| filter.include_own || q.owner_id != for_user)
        .collect();

    // thread_rng is !Send, so it must not live across an await point.
    let chosen = {
        let mut rng = rand::thread_rng();
        choose_candidate(candidates, &mut rng)
    };
    let mut query = chosen.ok_or(MarketError::PoolEmpty)?;

    query.retrieval_count += 1;
    query.last_retrieved_at = Some(now_rfc3339());
    storage.update_query(snapshot, query.clone()).await?;
    Ok(query)
}

/// Uniform choice among open candidates. Answered queries are skipped even
/// if the caller passed them in.
pub fn choose_candidate<R: Rng + ?Sized>(
    candidates: Vec<QueryRecord>,
    rng: &mut R,
) -> Option<QueryRecord> {
    let open: Vec<QueryRecord> = candidates
        .into_iter()
        .filter(|q| QueryState::of(q) == QueryState::Open)
        .collect();
    open.choose(rng).cloned()
}
