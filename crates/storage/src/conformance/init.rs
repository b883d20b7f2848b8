//! Profile initialization conformance tests.

use std::future::Future;

use super::{make_profile, seed_profile, CaseOutcome};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "init",
            "insert_profile_visible_after_commit",
            insert_profile_visible_after_commit(factory).await,
        ),
        CaseOutcome::record(
            "init",
            "duplicate_profile_rejected",
            duplicate_profile_rejected(factory).await,
        ),
        CaseOutcome::record(
            "init",
            "duplicate_profile_in_same_snapshot_rejected",
            duplicate_profile_in_same_snapshot_rejected(factory).await,
        ),
        CaseOutcome::record(
            "init",
            "update_profile_persists_all_fields",
            update_profile_persists_all_fields(factory).await,
        ),
    ]
}

async fn insert_profile_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "alice", 20).await?;

    let profile = storage
        .get_profile("alice")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if profile != make_profile("alice", 20) {
        return Err(format!("unexpected profile: {profile:?}"));
    }
    Ok(())
}

async fn duplicate_profile_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "alice", 0).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .insert_profile(&mut snap, make_profile("alice", 5))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyExists { .. }) => {}
        other => return Err(format!("expected AlreadyExists, got {other:?}")),
    }

    let profile = storage
        .get_profile("alice")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if profile.balance != 0 {
        return Err(format!("original profile overwritten: {profile:?}"));
    }
    Ok(())
}

async fn duplicate_profile_in_same_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_profile(&mut snap, make_profile("bob", 0))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let second = storage.insert_profile(&mut snap, make_profile("bob", 0)).await;
    let _ = storage.abort_snapshot(snap).await;

    match second {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn update_profile_persists_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_profile(&storage, "carol", 100).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut profile = storage
        .get_profile_for_update(&mut snap, "carol")
        .await
        .map_err(|e| format!("get for update: {e}"))?;
    profile.balance = 70;
    profile.reserved = 20;
    profile.payout_account = Some("acct_carol".to_string());
    storage
        .update_profile(&mut snap, profile.clone())
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = storage
        .get_profile("carol")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored != profile {
        return Err(format!("expected {profile:?}, got {stored:?}"));
    }
    if stored.available() != 50 {
        return Err(format!("expected available 50, got {}", stored.available()));
    }
    Ok(())
}
