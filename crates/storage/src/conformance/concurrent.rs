use std::future::Future;
use std::sync::Arc;

use super::{make_response, seed_profile, seed_query, CaseOutcome};
use crate::{MarketStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<CaseOutcome>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CaseOutcome::record(
            "concurrent",
            "concurrent_answers_exactly_one_wins",
            concurrent_answers_exactly_one_wins(factory).await,
        ),
        CaseOutcome::record(
            "concurrent",
            "concurrent_debits_never_overdraw",
            concurrent_debits_never_overdraw(factory).await,
        ),
    ]
}

// ── Concurrent answers: exactly one wins ────────────────────────────────────

/// N tasks each open a snapshot, lock the same open query and try to attach
/// a response. Exactly one commit succeeds; every other task must observe
/// the query as answered (or hit the UNIQUE index) and abort.
async fn concurrent_answers_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_query(storage.as_ref(), "q-1", "alice").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut query = s.get_query_for_update(&mut snap, "q-1").await?;
            if !query.is_open() {
                s.abort_snapshot(snap).await?;
                return Ok(false);
            }
            let response_id = format!("r-{i}");
            match s
                .insert_response(&mut snap, make_response(&response_id, "bob", "q-1"))
                .await
            {
                Ok(()) => {}
                Err(StorageError::UniqueViolation { .. }) => {
                    s.abort_snapshot(snap).await?;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
            query.response_id = Some(response_id);
            s.update_query(&mut snap, query).await?;
            s.commit_snapshot(snap).await?;
            Ok(true)
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let responses = storage
        .list_responses(None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if responses.len() != 1 {
        return Err(format!("expected 1 stored response, got {}", responses.len()));
    }
    Ok(())
}

// ── Concurrent debits: check-then-act stays atomic ──────────────────────────

/// N tasks each try to debit 10 from a profile holding 50. Exactly five
/// succeed and the final balance is zero: no stale-balance check passes.
async fn concurrent_debits_never_overdraw<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_profile(storage.as_ref(), "alice", 50).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut profile = s.get_profile_for_update(&mut snap, "alice").await?;
            // Yield between check and write so a racing task gets a chance
            // to interleave if the backend does not hold the row lock.
            tokio::task::yield_now().await;
            if profile.available() < 10 {
                s.abort_snapshot(snap).await?;
                return Ok(false);
            }
            profile.balance -= 10;
            s.update_profile(&mut snap, profile).await?;
            s.commit_snapshot(snap).await?;
            Ok::<_, StorageError>(true)
        }));
    }

    let mut succeeded = 0usize;
    for handle in handles {
        let ok = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if ok {
            succeeded += 1;
        }
    }

    if succeeded != 5 {
        return Err(format!("expected 5 successful debits, got {succeeded}"));
    }
    let profile = storage
        .get_profile("alice")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if profile.balance != 0 {
        return Err(format!("expected final balance 0, got {}", profile.balance));
    }
    Ok(())
}
