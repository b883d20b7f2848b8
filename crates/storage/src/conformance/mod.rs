//! Backend-agnostic checks every `MarketStorage` implementation must pass.
//!
//! Each case gets its own empty store from a caller-supplied factory. Cases
//! are grouped by the guarantee they exercise: profile bootstrap, error
//! variants, snapshot visibility, commit atomicity, per-query and
//! per-response uniqueness, and racing writers.
//!
//! ```ignore
//! let report = parley_storage::conformance::run_conformance_suite(|| async {
//!     SqlStorage::connect_for_tests().await
//! })
//! .await;
//! assert!(report.is_clean(), "{report}");
//! ```

mod commit;
mod concurrent;
mod error;
mod init;
mod snapshot;
mod unique;

use std::fmt;
use std::future::Future;

use crate::record::{
    MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryRecord, RatingRecord, ResponseRecord,
};
use crate::MarketStorage;

/// Outcome of one conformance case.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub group: &'static str,
    pub case: &'static str,
    /// `None` when the case held.
    pub failure: Option<String>,
}

impl CaseOutcome {
    fn record(group: &'static str, case: &'static str, result: Result<(), String>) -> Self {
        CaseOutcome {
            group,
            case,
            failure: result.err(),
        }
    }

    pub fn held(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub cases: Vec<CaseOutcome>,
}

impl ConformanceReport {
    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.cases.iter().filter(|c| !c.held())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(f, "storage conformance: {} cases, {failed} broken", self.cases.len())?;
        for c in self.failures() {
            write!(
                f,
                "\n  {}::{}: {}",
                c.group,
                c.case,
                c.failure.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

/// Run every case group against stores produced by `factory`.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut cases = init::run_init_tests(&factory).await;
    cases.extend(error::run_error_tests(&factory).await);
    cases.extend(snapshot::run_snapshot_tests(&factory).await);
    cases.extend(commit::run_commit_tests(&factory).await);
    cases.extend(unique::run_unique_tests(&factory).await);
    cases.extend(concurrent::run_concurrent_tests(&factory).await);
    ConformanceReport { cases }
}

// Record builders shared by the case groups.

const TS: &str = "2025-01-01T00:00:00Z";

fn make_profile(user_id: &str, balance: u64) -> ProfileRecord {
    ProfileRecord {
        user_id: user_id.to_string(),
        balance,
        reserved: 0,
        payout_account: None,
        created_at: TS.to_string(),
    }
}

fn make_query(id: &str, owner_id: &str, bid: u64) -> QueryRecord {
    QueryRecord {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        text: "what colour is the sky?".to_string(),
        regex: "^.*$".to_string(),
        bid,
        created_at: TS.to_string(),
        retrieval_count: 0,
        last_retrieved_at: None,
        callback_url: None,
        response_id: None,
    }
}

fn make_response(id: &str, owner_id: &str, query_id: &str) -> ResponseRecord {
    ResponseRecord {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        query_id: query_id.to_string(),
        text: "blue".to_string(),
        created_at: TS.to_string(),
    }
}

fn make_rating(id: &str, response_id: &str, rater_id: &str) -> RatingRecord {
    RatingRecord {
        id: id.to_string(),
        response_id: response_id.to_string(),
        rater_id: rater_id.to_string(),
        satisfactory: true,
        created_at: TS.to_string(),
    }
}

fn make_event(id: &str, user_id: &str, kind: MoneyEventKind, amount: u64) -> MoneyEventRecord {
    MoneyEventRecord {
        id: id.to_string(),
        user_id: user_id.to_string(),
        kind,
        amount,
        external_ref: None,
        query_id: None,
        created_at: TS.to_string(),
    }
}

/// Commit a single profile so later tests start from a known row.
async fn seed_profile<S: MarketStorage>(
    storage: &S,
    user_id: &str,
    balance: u64,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_profile(&mut snap, make_profile(user_id, balance))
        .await
        .map_err(|e| format!("insert profile: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Commit a single open query.
async fn seed_query<S: MarketStorage>(
    storage: &S,
    query_id: &str,
    owner_id: &str,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_query(&mut snap, make_query(query_id, owner_id, 10))
        .await
        .map_err(|e| format!("insert query: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
