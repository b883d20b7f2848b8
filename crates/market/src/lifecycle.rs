//! Query and response lifecycle.
//!
//! A query is `Open` until exactly one valid response is accepted, then
//! `Answered` for good. Every transition here runs inside a caller-supplied
//! storage snapshot together with its ledger postings, so a rejected step
//! leaves no trace once the caller aborts.

use parley_storage::{
    MarketStorage, QueryRecord, RatingRecord, ResponseRecord, StorageError,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{MarketConfig, DEFAULT_REGEX};
use crate::error::MarketError;
use crate::ledger::{self, Posting};
use crate::notify::HttpCallbackTransport;
use crate::operation::{NewQuery, NewRating, NewResponse};
use crate::{new_id, now_rfc3339};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Open,
    Answered,
}

impl QueryState {
    pub fn of(query: &QueryRecord) -> Self {
        if query.is_open() {
            QueryState::Open
        } else {
            QueryState::Answered
        }
    }
}

/// Compile `pattern` so that it must match the whole text, not a substring.
pub fn compile_full_match(pattern: &str) -> Result<Regex, MarketError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| MarketError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Validate and insert a query, debiting the owner by its bid.
pub async fn create_query<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    owner_id: &str,
    input: NewQuery,
    config: &MarketConfig,
) -> Result<QueryRecord, MarketError> {
    if input.text.trim().is_empty() {
        return Err(MarketError::InvalidInput(
            "query text must not be empty".to_string(),
        ));
    }
    let bid = input.bid.unwrap_or(config.default_bid);
    if bid < config.min_bid {
        return Err(MarketError::AmountTooSmall {
            amount: bid,
            reason: format!("bid must be at least {}", config.min_bid),
        });
    }
    let regex = input.regex.unwrap_or_else(|| DEFAULT_REGEX.to_string());
    compile_full_match(&regex)?;
    if let Some(url) = &input.callback_url {
        HttpCallbackTransport::validate_url(url)
            .map_err(|e| MarketError::InvalidInput(e.to_string()))?;
    }

    let query = QueryRecord {
        id: new_id(),
        owner_id: owner_id.to_string(),
        text: input.text,
        regex,
        bid,
        created_at: now_rfc3339(),
        retrieval_count: 0,
        last_retrieved_at: None,
        callback_url: input.callback_url,
        response_id: None,
    };
    storage.insert_query(snapshot, query.clone()).await?;
    ledger::debit(storage, snapshot, owner_id, Posting::bid(bid, &query.id)).await?;
    Ok(query)
}

/// Accept a response: mark the query answered and pay the responder.
///
/// Returns the stored response and the query as it now stands.
pub async fn create_response<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    responder_id: &str,
    input: NewResponse,
) -> Result<(ResponseRecord, QueryRecord), MarketError> {
    let mut query = storage.get_query_for_update(snapshot, &input.query_id).await?;
    if QueryState::of(&query) == QueryState::Answered {
        return Err(MarketError::AlreadyAnswered { query_id: query.id });
    }

    let matcher = compile_full_match(&query.regex)?;
    if !matcher.is_match(&input.text) {
        return Err(MarketError::RegexMismatch {
            text: input.text,
            pattern: query.regex,
        });
    }

    let response = ResponseRecord {
        id: new_id(),
        owner_id: responder_id.to_string(),
        query_id: query.id.clone(),
        text: input.text,
        created_at: now_rfc3339(),
    };
    storage
        .insert_response(snapshot, response.clone())
        .await
        .map_err(|e| match e {
            StorageError::UniqueViolation { .. } => MarketError::AlreadyAnswered {
                query_id: query.id.clone(),
            },
            other => other.into(),
        })?;

    query.response_id = Some(response.id.clone());
    storage.update_query(snapshot, query.clone()).await?;
    ledger::credit(
        storage,
        snapshot,
        responder_id,
        Posting::earning(query.bid, &query.id),
    )
    .await?;
    Ok((response, query))
}

/// Record the query owner's verdict on a response. One rating per response.
pub async fn create_rating<S: MarketStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    rater_id: &str,
    input: NewRating,
) -> Result<RatingRecord, MarketError> {
    let response = storage
        .get_response_for_update(snapshot, &input.response_id)
        .await?;
    let query = storage
        .get_query_for_update(snapshot, &response.query_id)
        .await?;
    if query.owner_id != rater_id {
        return Err(MarketError::NotQueryOwner {
            user_id: rater_id.to_string(),
            query_id: query.id,
        });
    }

    let rating = RatingRecord {
        id: new_id(),
        response_id: response.id.clone(),
        rater_id: rater_id.to_string(),
        satisfactory: input.satisfactory,
        created_at: now_rfc3339(),
    };
    storage
        .insert_rating(snapshot, rating.clone())
        .await
        .map_err(|e| match e {
            StorageError::UniqueViolation { .. } => MarketError::AlreadyRated {
                response_id: response.id.clone(),
            },
            other => other.into(),
        })?;
    Ok(rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_is_anchored() {
        let re = compile_full_match("yes|no").unwrap();
        assert!(re.is_match("yes"));
        assert!(re.is_match("no"));
        assert!(!re.is_match("yes please"));
        assert!(!re.is_match("not sure"));
    }

    #[test]
    fn default_pattern_accepts_anything_on_one_line() {
        let re = compile_full_match(DEFAULT_REGEX).unwrap();
        assert!(re.is_match(""));
        assert!(re.is_match("anything at all"));
    }

    #[test]
    fn broken_pattern_reports_invalid_regex() {
        let err = compile_full_match("(unclosed").unwrap_err();
        match err {
            MarketError::InvalidRegex { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidRegex, got {other:?}"),
        }
    }

    #[test]
    fn state_follows_response_id() {
        let mut query = QueryRecord {
            id: "q".to_string(),
            owner_id: "alice".to_string(),
            text: "?".to_string(),
            regex: DEFAULT_REGEX.to_string(),
            bid: 1,
            created_at: String::new(),
            retrieval_count: 0,
            last_retrieved_at: None,
            callback_url: None,
            response_id: None,
        };
        assert_eq!(QueryState::of(&query), QueryState::Open);
        query.response_id = Some("r".to_string());
        assert_eq!(QueryState::of(&query), QueryState::Answered);
    }
}
