//! HTTP route handlers. Each one is a thin shim over a `Market` method.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_market::{
    AttributeInput, AttributeKey, DepositRequest, MarketError, MoneyEventListing, NewQuery,
    NewRating, NewResponse, Operation, PayoutAccount, PoolFilter, QueryListing, WithdrawRequest,
};
use serde::Serialize;

use super::json_error;
use super::middleware::Actor;
use super::state::AppState;

/// HTTP status for a market error.
pub(crate) fn status_for(err: &MarketError) -> StatusCode {
    match err {
        MarketError::AlreadyAnswered { .. }
        | MarketError::AlreadyRated { .. }
        | MarketError::AlreadyRegistered { .. } => StatusCode::CONFLICT,
        MarketError::NotFound { .. } | MarketError::PoolEmpty => StatusCode::NOT_FOUND,
        MarketError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        MarketError::NotQueryOwner { .. } => StatusCode::FORBIDDEN,
        MarketError::Gateway(_) => StatusCode::BAD_GATEWAY,
        MarketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MarketError::RegexMismatch { .. }
        | MarketError::InvalidRegex { .. }
        | MarketError::AmountTooSmall { .. }
        | MarketError::PayoutAccountMissing { .. }
        | MarketError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn error_response(err: MarketError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!(code = err.code(), error = %err, "request failed");
    }
    let body = serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
        "retry": matches!(err, MarketError::PoolEmpty),
    });
    (status, Json(body)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, MarketError>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "gateway": state.market.gateway_id(),
    });
    (StatusCode::OK, Json(response))
}

/// GET /metrics
pub(crate) async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.market.metrics().snapshot()))
}

// ── Users ─────────────────────────────────────────────────────────────────

/// POST /users
pub(crate) async fn handle_register_user(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
) -> Response {
    respond(StatusCode::CREATED, state.market.register_user(&user).await)
}

/// GET /profile
pub(crate) async fn handle_get_profile(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
) -> Response {
    respond(StatusCode::OK, state.market.profile(&user).await)
}

/// POST /profile/payout-account
pub(crate) async fn handle_register_payout_account(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<PayoutAccount>,
) -> Response {
    respond(
        StatusCode::OK,
        state
            .market
            .register_payout_account(&user, &input.account)
            .await,
    )
}

// ── Queries, responses, ratings ───────────────────────────────────────────

/// GET /queries
pub(crate) async fn handle_list_queries(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Query(listing): Query<QueryListing>,
) -> Response {
    respond(StatusCode::OK, state.market.list_queries(&user, &listing).await)
}

/// POST /queries
pub(crate) async fn handle_create_query(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<NewQuery>,
) -> Response {
    respond(StatusCode::CREATED, state.market.create_query(&user, input).await)
}

/// GET /queries/next
pub(crate) async fn handle_next_query(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Query(filter): Query<PoolFilter>,
) -> Response {
    respond(StatusCode::OK, state.market.serve_query(&user, &filter).await)
}

/// GET /responses
pub(crate) async fn handle_list_responses(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
) -> Response {
    respond(StatusCode::OK, state.market.list_responses(&user).await)
}

/// POST /responses
pub(crate) async fn handle_create_response(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<NewResponse>,
) -> Response {
    respond(
        StatusCode::CREATED,
        state.market.create_response(&user, input).await,
    )
}

/// GET /responses/{id}/rating
pub(crate) async fn handle_get_rating(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Path(response_id): Path<String>,
) -> Response {
    respond(
        StatusCode::OK,
        state.market.rating_for(&user, &response_id).await,
    )
}

/// POST /ratings
pub(crate) async fn handle_create_rating(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<NewRating>,
) -> Response {
    respond(
        StatusCode::CREATED,
        state.market.create_rating(&user, input).await,
    )
}

// ── Money ─────────────────────────────────────────────────────────────────

/// GET /money-events
pub(crate) async fn handle_list_money_events(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Query(listing): Query<MoneyEventListing>,
) -> Response {
    respond(
        StatusCode::OK,
        state.market.list_money_events(&user, listing.kind).await,
    )
}

/// POST /deposits
pub(crate) async fn handle_deposit(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<DepositRequest>,
) -> Response {
    respond(StatusCode::CREATED, state.market.deposit(&user, input).await)
}

/// POST /transfers
pub(crate) async fn handle_transfer(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<WithdrawRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        state.market.transfer(&user, input).await,
    )
}

/// POST /payouts
pub(crate) async fn handle_payout(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<WithdrawRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        state.market.payout(&user, input).await,
    )
}

// ── Attributes ────────────────────────────────────────────────────────────

/// GET /attributes
pub(crate) async fn handle_list_attributes(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
) -> Response {
    respond(StatusCode::OK, state.market.list_attributes(&user).await)
}

/// POST /attributes
pub(crate) async fn handle_set_attribute(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(input): Json<AttributeInput>,
) -> Response {
    respond(StatusCode::OK, state.market.set_attribute(&user, input).await)
}

/// DELETE /attributes/{key}
pub(crate) async fn handle_delete_attribute(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Path(key): Path<String>,
) -> Response {
    let result = state
        .market
        .delete_attribute(&user, &key)
        .await
        .map(|()| AttributeKey { key });
    respond(StatusCode::OK, result)
}

// ── Generic dispatch ──────────────────────────────────────────────────────

/// POST /operations
pub(crate) async fn handle_operation(
    State(state): State<Arc<AppState>>,
    Actor(user): Actor,
    Json(operation): Json<Operation>,
) -> Response {
    respond(StatusCode::OK, state.market.execute(&user, operation).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_market::GatewayError;
    use parley_storage::StorageError;

    #[test]
    fn race_losses_and_duplicates_are_conflicts() {
        for err in [
            MarketError::AlreadyAnswered {
                query_id: "q".to_string(),
            },
            MarketError::AlreadyRated {
                response_id: "r".to_string(),
            },
            MarketError::AlreadyRegistered {
                user_id: "u".to_string(),
            },
        ] {
            assert_eq!(status_for(&err), StatusCode::CONFLICT, "{err}");
        }
    }

    #[test]
    fn validation_failures_are_unprocessable() {
        let err = MarketError::RegexMismatch {
            text: "maybe".to_string(),
            pattern: "yes|no".to_string(),
        };
        assert_eq!(status_for(&err), StatusCode::UNPROCESSABLE_ENTITY);
        let err = MarketError::AmountTooSmall {
            amount: 40,
            reason: "minimum amount is 50".to_string(),
        };
        assert_eq!(status_for(&err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn money_and_infrastructure_statuses() {
        let err = MarketError::InsufficientBalance {
            user_id: "u".to_string(),
            required: 100,
            available: 30,
        };
        assert_eq!(status_for(&err), StatusCode::PAYMENT_REQUIRED);
        let err = MarketError::Gateway(GatewayError::NotConfigured("base_url".to_string()));
        assert_eq!(status_for(&err), StatusCode::BAD_GATEWAY);
        let err = MarketError::Storage(StorageError::Backend("disk".to_string()));
        assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn pool_empty_is_retryable_not_found() {
        let response = error_response(MarketError::PoolEmpty);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "pool_empty");
        assert_eq!(body["retry"], true);
    }
}
