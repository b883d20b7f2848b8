//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{make_query, seed_profile, seed_query, CaseOutcome};
use crate::{MarketStorage, QueryFilter, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "snapshot",
            "uncommitted_query_invisible",
            uncommitted_query_invisible(factory).await,
        ),
        CaseOutcome::record(
            "snapshot",
            "uncommitted_balance_change_invisible",
            uncommitted_balance_change_invisible(factory).await,
        ),
        CaseOutcome::record(
            "snapshot",
            "snapshot_reads_its_own_writes",
            snapshot_reads_its_own_writes(factory).await,
        ),
        CaseOutcome::record(
            "snapshot",
            "abort_discards_writes",
            abort_discards_writes(factory).await,
        ),
        CaseOutcome::record(
            "snapshot",
            "drop_discards_writes",
            drop_discards_writes(factory).await,
        ),
    ]
}

async fn uncommitted_query_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_query(&mut snap, make_query("q-1", "alice", 5))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let get = storage.get_query("q-1").await;
    let listed = storage
        .list_queries(&QueryFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;

    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if !matches!(get, Err(StorageError::NotFound { .. })) {
        return Err(format!("uncommitted query visible to get: {get:?}"));
    }
    if !listed.is_empty() {
        return Err(format!("uncommitted query visible to list: {listed:?}"));
    }

    storage
        .get_query("q-1")
        .await
        .map_err(|e| format!("committed query not visible: {e}"))?;
    Ok(())
}

async fn uncommitted_balance_change_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "alice", 20).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut profile = storage
        .get_profile_for_update(&mut snap, "alice")
        .await
        .map_err(|e| format!("get for update: {e}"))?;
    profile.balance = 5;
    storage
        .update_profile(&mut snap, profile)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = storage
        .get_profile("alice")
        .await
        .map_err(|e| format!("get: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if outside.balance != 20 {
        return Err(format!(
            "uncommitted balance visible: expected 20, got {}",
            outside.balance
        ));
    }
    let after = storage
        .get_profile("alice")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if after.balance != 5 {
        return Err(format!("committed balance: expected 5, got {}", after.balance));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_query(&mut snap, make_query("q-own", "alice", 3))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let read = storage
        .get_query_for_update(&mut snap, "q-own")
        .await
        .map_err(|e| format!("read own write: {e}"))?;
    let open = storage
        .list_queries_for_update(&mut snap, &QueryFilter::open())
        .await
        .map_err(|e| format!("list own writes: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;

    if read.bid != 3 {
        return Err(format!("expected bid 3, got {}", read.bid));
    }
    if open.len() != 1 {
        return Err(format!("expected 1 open query, got {}", open.len()));
    }
    Ok(())
}

async fn abort_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_query(&storage, "q-1", "alice").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut query = storage
        .get_query_for_update(&mut snap, "q-1")
        .await
        .map_err(|e| format!("get for update: {e}"))?;
    query.retrieval_count = 9;
    storage
        .update_query(&mut snap, query)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .insert_query(&mut snap, make_query("q-2", "alice", 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let q1 = storage
        .get_query("q-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if q1.retrieval_count != 0 {
        return Err(format!(
            "aborted update visible: retrieval_count {}",
            q1.retrieval_count
        ));
    }
    if storage.get_query("q-2").await.is_ok() {
        return Err("aborted insert visible".to_string());
    }
    Ok(())
}

async fn drop_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .insert_query(&mut snap, make_query("q-dropped", "alice", 1))
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }

    if storage.get_query("q-dropped").await.is_ok() {
        return Err("dropped snapshot's insert visible".to_string());
    }

    // The backend must still accept new snapshots after a drop.
    let snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin after drop: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))
}
