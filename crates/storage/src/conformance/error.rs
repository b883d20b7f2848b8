//! Error variant conformance tests.
//!
//! Verifies that reads and updates of missing rows fail with `NotFound`
//! rather than a backend error or a silent no-op.

use std::future::Future;

use super::{make_profile, make_query, CaseOutcome};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "error",
            "missing_rows_not_found",
            missing_rows_not_found(factory).await,
        ),
        CaseOutcome::record(
            "error",
            "update_missing_rows_not_found",
            update_missing_rows_not_found(factory).await,
        ),
        CaseOutcome::record(
            "error",
            "delete_missing_attribute_not_found",
            delete_missing_attribute_not_found(factory).await,
        ),
    ]
}

fn expect_not_found<T: std::fmt::Debug>(
    what: &str,
    result: Result<T, StorageError>,
) -> Result<(), String> {
    match result {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("{what}: expected NotFound, got {other:?}")),
    }
}

async fn missing_rows_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    expect_not_found("get_profile", storage.get_profile("nobody").await)?;
    expect_not_found("get_query", storage.get_query("q-none").await)?;
    expect_not_found("get_response", storage.get_response("r-none").await)?;

    let rating = storage
        .get_rating_for_response("r-none")
        .await
        .map_err(|e| format!("get rating: {e}"))?;
    if rating.is_some() {
        return Err("rating returned for missing response".to_string());
    }

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let profile = storage.get_profile_for_update(&mut snap, "nobody").await;
    let query = storage.get_query_for_update(&mut snap, "q-none").await;
    let response = storage.get_response_for_update(&mut snap, "r-none").await;
    let _ = storage.abort_snapshot(snap).await;

    expect_not_found("get_profile_for_update", profile)?;
    expect_not_found("get_query_for_update", query)?;
    expect_not_found("get_response_for_update", response)
}

async fn update_missing_rows_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let profile = storage
        .update_profile(&mut snap, make_profile("ghost", 1))
        .await;
    let query = storage
        .update_query(&mut snap, make_query("q-ghost", "ghost", 1))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    expect_not_found("update_profile", profile)?;
    expect_not_found("update_query", query)
}

async fn delete_missing_attribute_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage.delete_attribute(&mut snap, "alice", "email").await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found("delete_attribute", result)
}
