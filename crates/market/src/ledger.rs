//! Balance bookkeeping.
//!
//! Every balance change goes through this module and is paired, inside the
//! same storage snapshot, with an append-only money event. A profile's
//! `balance` therefore always equals the signed sum of its events, which
//! [`audit`] re-derives on demand.
//!
//! Outbound gateway calls use a reservation: [`reserve`] earmarks funds,
//! then either [`settle`] turns the reservation into a debit with its event
//! or [`release`] hands the funds back. `available = balance - reserved` is
//! what debits and reservations are checked against.

use parley_storage::{MarketStorage, MoneyEventKind, MoneyEventRecord, ProfileRecord};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::{new_id, now_rfc3339};

/// A single balance change and the money event recording it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub kind: MoneyEventKind,
    pub amount: u64,
    /// Gateway transaction id, for deposits, transfers and payouts.
    pub external_ref: Option<String>,
    /// Query the posting belongs to, for bids and earnings.
    pub query_id: Option<String>,
}

impl Posting {
    pub fn bid(amount: u64, query_id: &str) -> Self {
        Self {
            kind: MoneyEventKind::Bid,
            amount,
            external_ref: None,
            query_id: Some(query_id.to_string()),
        }
    }

    pub fn earning(amount: u64, query_id: &str) -> Self {
        Self {
            kind: MoneyEventKind::Earning,
            amount,
            external_ref: None,
            query_id: Some(query_id.to_string()),
        }
    }

    pub fn external(kind: MoneyEventKind, amount: u64, external_ref: &str) -> Self {
        Self {
            kind,
            amount,
            external_ref: Some(external_ref.to_string()),
            query_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: u64,
    pub reserved: u64,
    pub available: u64,
}

impl From<&ProfileRecord> for Balance {
    fn from(profile: &ProfileRecord) -> Self {
        Balance {
            balance: profile.balance,
            reserved: profile.reserved,
            available: profile.available(),
        }
    }
}

/// Result of re-deriving a balance from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub user_id: String,
    pub stored_balance: u64,
    pub event_sum: i128,
    pub event_count: usize,
    pub consistent: bool,
}

/// Add `posting.amount` to the user's balance.
pub async fn credit<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    posting: Posting,
) -> Result<ProfileRecord, MarketError> {
    if !posting.kind.is_credit() {
        return Err(MarketError::InvalidInput(format!(
            "{} is not a credit",
            posting.kind.as_str()
        )));
    }
    ensure_positive(posting.amount)?;

    let mut profile = storage.get_profile_for_update(snapshot, user_id).await?;
    profile.balance = profile
        .balance
        .checked_add(posting.amount)
        .ok_or_else(|| MarketError::InvalidInput("balance overflow".to_string()))?;
    storage.update_profile(snapshot, profile.clone()).await?;
    append_event(storage, snapshot, user_id, posting).await?;
    Ok(profile)
}

/// Subtract `posting.amount` from the user's balance.
///
/// Fails with `InsufficientBalance` and changes nothing if the available
/// balance, read under the row lock, does not cover the amount.
pub async fn debit<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    posting: Posting,
) -> Result<ProfileRecord, MarketError> {
    if posting.kind.is_credit() {
        return Err(MarketError::InvalidInput(format!(
            "{} is not a debit",
            posting.kind.as_str()
        )));
    }
    ensure_positive(posting.amount)?;

    let mut profile = storage.get_profile_for_update(snapshot, user_id).await?;
    ensure_available(&profile, posting.amount)?;
    profile.balance -= posting.amount;
    storage.update_profile(snapshot, profile.clone()).await?;
    append_event(storage, snapshot, user_id, posting).await?;
    Ok(profile)
}

/// Earmark `amount` for an outbound gateway call.
pub async fn reserve<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    amount: u64,
) -> Result<ProfileRecord, MarketError> {
    ensure_positive(amount)?;
    let mut profile = storage.get_profile_for_update(snapshot, user_id).await?;
    ensure_available(&profile, amount)?;
    profile.reserved += amount;
    storage.update_profile(snapshot, profile.clone()).await?;
    Ok(profile)
}

/// Return a reservation to the available balance. No event is written:
/// the balance itself never changed.
pub async fn release<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    amount: u64,
) -> Result<ProfileRecord, MarketError> {
    let mut profile = storage.get_profile_for_update(snapshot, user_id).await?;
    profile.reserved = profile.reserved.checked_sub(amount).ok_or_else(|| {
        MarketError::InvalidInput(format!(
            "cannot release {amount}: only {} reserved",
            profile.reserved
        ))
    })?;
    storage.update_profile(snapshot, profile.clone()).await?;
    Ok(profile)
}

/// Convert a reservation into a debit with its money event.
pub async fn settle<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    posting: Posting,
) -> Result<ProfileRecord, MarketError> {
    if posting.kind.is_credit() {
        return Err(MarketError::InvalidInput(format!(
            "{} is not a debit",
            posting.kind.as_str()
        )));
    }
    let mut profile = storage.get_profile_for_update(snapshot, user_id).await?;
    if profile.reserved < posting.amount || profile.balance < posting.amount {
        return Err(MarketError::InvalidInput(format!(
            "cannot settle {}: only {} reserved",
            posting.amount, profile.reserved
        )));
    }
    profile.reserved -= posting.amount;
    profile.balance -= posting.amount;
    storage.update_profile(snapshot, profile.clone()).await?;
    append_event(storage, snapshot, user_id, posting).await?;
    Ok(profile)
}

/// Current committed balance.
pub async fn get_balance<S: MarketStorage>(
    storage: &S,
    user_id: &str,
) -> Result<Balance, MarketError> {
    let profile = storage.get_profile(user_id).await?;
    Ok(Balance::from(&profile))
}

/// Re-derive the balance from the user's money events and compare it with
/// the stored balance.
pub async fn audit<S: MarketStorage>(
    storage: &S,
    user_id: &str,
) -> Result<LedgerAudit, MarketError> {
    let profile = storage.get_profile(user_id).await?;
    let events = storage.list_money_events(user_id, None).await?;
    let event_sum: i128 = events.iter().map(MoneyEventRecord::signed_amount).sum();
    Ok(LedgerAudit {
        user_id: user_id.to_string(),
        stored_balance: profile.balance,
        event_sum,
        event_count: events.len(),
        consistent: event_sum == profile.balance as i128,
    })
}

fn ensure_positive(amount: u64) -> Result<(), MarketError> {
    if amount == 0 {
        return Err(MarketError::AmountTooSmall {
            amount,
            reason: "amount must be positive".to_string(),
        });
    }
    Ok(())
}

fn ensure_available(profile: &ProfileRecord, amount: u64) -> Result<(), MarketError> {
    let available = profile.available();
    if available < amount {
        return Err(MarketError::InsufficientBalance {
            user_id: profile.user_id.clone(),
            required: amount,
            available,
        });
    }
    Ok(())
}

async fn append_event<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    user_id: &str,
    posting: Posting,
) -> Result<(), MarketError> {
    let record = MoneyEventRecord {
        id: new_id(),
        user_id: user_id.to_string(),
        kind: posting.kind,
        amount: posting.amount,
        external_ref: posting.external_ref,
        query_id: posting.query_id,
        created_at: now_rfc3339(),
    };
    storage.insert_money_event(snapshot, record).await?;
    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
