//! Atomic commit conformance tests.
//!
//! A snapshot that touches several tables (the shape of answering a query:
//! insert response, mark query answered, credit responder, append money
//! event) must become visible all at once or not at all.

use std::future::Future;

use super::{make_event, make_response, seed_profile, seed_query, CaseOutcome};
use crate::{AttributeRecord, MarketStorage, MoneyEventKind};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "commit",
            "multi_table_commit_all_visible",
            multi_table_commit_all_visible(factory).await,
        ),
        CaseOutcome::record(
            "commit",
            "multi_table_abort_none_visible",
            multi_table_abort_none_visible(factory).await,
        ),
        CaseOutcome::record(
            "commit",
            "money_events_listed_in_insertion_order",
            money_events_listed_in_insertion_order(factory).await,
        ),
        CaseOutcome::record(
            "commit",
            "attribute_upsert_overwrites_value",
            attribute_upsert_overwrites_value(factory).await,
        ),
    ]
}

/// Stage the four writes of a successful answer without committing.
async fn stage_answer<S: MarketStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
) -> Result<(), String> {
    storage
        .insert_response(snap, make_response("r-1", "bob", "q-1"))
        .await
        .map_err(|e| format!("insert response: {e}"))?;
    let mut query = storage
        .get_query_for_update(snap, "q-1")
        .await
        .map_err(|e| format!("get query: {e}"))?;
    query.response_id = Some("r-1".to_string());
    storage
        .update_query(snap, query)
        .await
        .map_err(|e| format!("update query: {e}"))?;
    let mut profile = storage
        .get_profile_for_update(snap, "bob")
        .await
        .map_err(|e| format!("get profile: {e}"))?;
    profile.balance += 10;
    storage
        .update_profile(snap, profile)
        .await
        .map_err(|e| format!("update profile: {e}"))?;
    storage
        .insert_money_event(snap, make_event("ev-1", "bob", MoneyEventKind::Earning, 10))
        .await
        .map_err(|e| format!("insert event: {e}"))
}

async fn multi_table_commit_all_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "bob", 0).await?;
    seed_query(&storage, "q-1", "alice").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    stage_answer(&storage, &mut snap).await?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    storage
        .get_response("r-1")
        .await
        .map_err(|e| format!("response missing: {e}"))?;
    let query = storage
        .get_query("q-1")
        .await
        .map_err(|e| format!("get query: {e}"))?;
    if query.response_id.as_deref() != Some("r-1") {
        return Err(format!("query not linked: {:?}", query.response_id));
    }
    let profile = storage
        .get_profile("bob")
        .await
        .map_err(|e| format!("get profile: {e}"))?;
    if profile.balance != 10 {
        return Err(format!("expected balance 10, got {}", profile.balance));
    }
    let events = storage
        .list_money_events("bob", None)
        .await
        .map_err(|e| format!("list events: {e}"))?;
    if events.len() != 1 {
        return Err(format!("expected 1 event, got {}", events.len()));
    }
    Ok(())
}

async fn multi_table_abort_none_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "bob", 0).await?;
    seed_query(&storage, "q-1", "alice").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    stage_answer(&storage, &mut snap).await?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    if storage.get_response("r-1").await.is_ok() {
        return Err("aborted response visible".to_string());
    }
    let query = storage
        .get_query("q-1")
        .await
        .map_err(|e| format!("get query: {e}"))?;
    if !query.is_open() {
        return Err("aborted answer closed the query".to_string());
    }
    let profile = storage
        .get_profile("bob")
        .await
        .map_err(|e| format!("get profile: {e}"))?;
    if profile.balance != 0 {
        return Err(format!("aborted credit visible: {}", profile.balance));
    }
    let events = storage
        .list_money_events("bob", None)
        .await
        .map_err(|e| format!("list events: {e}"))?;
    if !events.is_empty() {
        return Err(format!("aborted events visible: {events:?}"));
    }
    Ok(())
}

async fn money_events_listed_in_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let kinds = [
        ("ev-a", MoneyEventKind::Deposit),
        ("ev-b", MoneyEventKind::Bid),
        ("ev-c", MoneyEventKind::Payout),
    ];
    for (id, kind) in kinds {
        storage
            .insert_money_event(&mut snap, make_event(id, "alice", kind, 1))
            .await
            .map_err(|e| format!("insert {id}: {e}"))?;
    }
    storage
        .insert_money_event(&mut snap, make_event("ev-x", "bob", MoneyEventKind::Deposit, 1))
        .await
        .map_err(|e| format!("insert ev-x: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let ids: Vec<String> = storage
        .list_money_events("alice", None)
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if ids != ["ev-a", "ev-b", "ev-c"] {
        return Err(format!("unexpected order or owner filter: {ids:?}"));
    }

    let deposits = storage
        .list_money_events("alice", Some(MoneyEventKind::Deposit))
        .await
        .map_err(|e| format!("list deposits: {e}"))?;
    if deposits.len() != 1 {
        return Err(format!("kind filter: expected 1, got {}", deposits.len()));
    }
    Ok(())
}

async fn attribute_upsert_overwrites_value<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let first = storage
        .upsert_attribute(
            &mut snap,
            AttributeRecord {
                id: "attr-1".to_string(),
                user_id: "alice".to_string(),
                key: "language".to_string(),
                value: "en".to_string(),
            },
        )
        .await
        .map_err(|e| format!("first upsert: {e}"))?;
    let second = storage
        .upsert_attribute(
            &mut snap,
            AttributeRecord {
                id: "attr-2".to_string(),
                user_id: "alice".to_string(),
                key: "language".to_string(),
                value: "fr".to_string(),
            },
        )
        .await
        .map_err(|e| format!("second upsert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if second.id != first.id || second.value != "fr" {
        return Err(format!("upsert should keep id and replace value: {second:?}"));
    }
    let attrs = storage
        .list_attributes("alice")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if attrs.len() != 1 {
        return Err(format!("expected 1 attribute, got {}", attrs.len()));
    }
    Ok(())
}
