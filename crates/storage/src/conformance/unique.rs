//! Uniqueness constraint conformance tests.

use std::future::Future;

use super::{make_rating, make_response, seed_query, CaseOutcome};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_unique_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "unique",
            "second_response_for_query_rejected",
            second_response_for_query_rejected(factory).await,
        ),
        CaseOutcome::record(
            "unique",
            "second_rating_for_response_rejected",
            second_rating_for_response_rejected(factory).await,
        ),
    ]
}

async fn second_response_for_query_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    storage
        .insert_response(&mut snap, make_response("r-1", "bob", "q-1"))
        .await
        .map_err(|e| format!("first response: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let second = storage
        .insert_response(&mut snap, make_response("r-2", "carol", "q-1"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match second {
        Err(StorageError::UniqueViolation { column, .. }) if column == "query_id" => {}
        other => return Err(format!("expected UniqueViolation(query_id), got {other:?}")),
    }

    let responses = storage
        .list_responses(None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if responses.len() != 1 || responses[0].owner_id != "bob" {
        return Err(format!("unexpected responses: {responses:?}"));
    }
    Ok(())
}

async fn second_rating_for_response_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_rating(&mut snap, make_rating("rt-1", "r-1", "alice"))
        .await
        .map_err(|e| format!("first rating: {e}"))?;
    let second = storage
        .insert_rating(&mut snap, make_rating("rt-2", "r-1", "alice"))
        .await;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    match second {
        Err(StorageError::UniqueViolation { column, .. }) if column == "response_id" => {}
        other => return Err(format!("expected UniqueViolation(response_id), got {other:?}")),
    }

    let rating = storage
        .get_rating_for_response("r-1")
        .await
        .map_err(|e| format!("get rating: {e}"))?;
    match rating {
        Some(r) if r.id == "rt-1" => Ok(()),
        other => Err(format!("expected first rating kept, got {other:?}")),
    }
}
