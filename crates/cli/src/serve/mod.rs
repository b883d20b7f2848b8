//! `parley serve` -- HTTP JSON API for the marketplace.
//!
//! Identity comes from the `X-Parley-User` header, which an upstream
//! identity proxy is trusted to set. An optional shared API key
//! (`PARLEY_API_KEY` or `[server].api_key`) guards every route except
//! `/health`.
//!
//! Endpoints:
//! - GET    /health                  - Server status (exempt from auth)
//! - GET    /metrics                 - Race, gateway and callback counters
//! - POST   /users                   - Register the calling user
//! - GET    /profile                 - Balance and payout account
//! - POST   /profile/payout-account  - Register the payout destination
//! - GET    /queries                 - Caller's queries (`?open=true|false`)
//! - POST   /queries                 - Post a query with a bid
//! - GET    /queries/next            - Random open query (`?min_bid=&include_own=`)
//! - GET    /responses               - Caller's responses
//! - POST   /responses               - Answer a query
//! - GET    /responses/{id}/rating   - Rating of a response, or null
//! - POST   /ratings                 - Rate a response to one of your queries
//! - GET    /money-events            - Caller's money events (`?kind=`)
//! - POST   /deposits                - Charge a payment source
//! - POST   /transfers               - Transfer to the connected account
//! - POST   /payouts                 - Pay out to the registered destination
//! - GET    /attributes              - Caller's attributes
//! - POST   /attributes              - Set an attribute
//! - DELETE /attributes/{key}        - Delete an attribute
//! - POST   /operations              - Any operation in tagged JSON form
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{middleware as axum_middleware, Json, Router};
use parley_market::{HttpGateway, Market, PaymentGateway, SandboxGateway};
use parley_storage::MemoryStorage;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::*;
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::ParleyConfig;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub(crate) struct ServeOptions {
    pub(crate) config: ParleyConfig,
    /// Use the in-process sandbox gateway.
    pub(crate) sandbox: bool,
    pub(crate) tls_cert: Option<PathBuf>,
    pub(crate) tls_key: Option<PathBuf>,
}

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/users", post(handle_register_user))
        .route("/profile", get(handle_get_profile))
        .route(
            "/profile/payout-account",
            post(handle_register_payout_account),
        )
        .route("/queries", get(handle_list_queries).post(handle_create_query))
        .route("/queries/next", get(handle_next_query))
        .route(
            "/responses",
            get(handle_list_responses).post(handle_create_response),
        )
        .route("/responses/{id}/rating", get(handle_get_rating))
        .route("/ratings", post(handle_create_rating))
        .route("/money-events", get(handle_list_money_events))
        .route("/deposits", post(handle_deposit))
        .route("/transfers", post(handle_transfer))
        .route("/payouts", post(handle_payout))
        .route(
            "/attributes",
            get(handle_list_attributes).post(handle_set_attribute),
        )
        .route("/attributes/{key}", delete(handle_delete_attribute))
        .route("/operations", post(handle_operation))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub(crate) async fn start_server(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ServeOptions {
        config,
        sandbox,
        tls_cert: _tls_cert,
        tls_key: _tls_key,
    } = options;

    let gateway: Arc<dyn PaymentGateway> = if sandbox {
        tracing::warn!("using sandbox payment gateway; no real money moves");
        Arc::new(SandboxGateway::new())
    } else {
        Arc::new(HttpGateway::new(&config.market.gateway).map_err(|e| {
            format!("{e}; set [market.gateway] or PARLEY_GATEWAY_URL, or pass --sandbox")
        })?)
    };

    if config.server.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let market = Market::new(MemoryStorage::new(), gateway, config.market);
    let state = Arc::new(AppState {
        market,
        api_key: config.server.api_key,
    });
    let app = build_router(state);

    let port = config.server.port;
    let addr = format!("0.0.0.0:{}", port);

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let rustls =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!(port, "parley listening on https");
        axum_server::bind_rustls(socket_addr, rustls)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    #[cfg(not(feature = "tls"))]
    if _tls_cert.is_some() {
        return Err("TLS requested but parley was built without the `tls` feature".into());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(port, "parley listening on http");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use parley_market::MarketConfig;
    use tower::util::ServiceExt;

    fn app(api_key: Option<&str>) -> Router {
        let market = Market::new(
            MemoryStorage::new(),
            Arc::new(SandboxGateway::new()),
            MarketConfig::default(),
        );
        build_router(Arc::new(AppState {
            market,
            api_key: api_key.map(str::to_string),
        }))
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(path: &str, user: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(path)
            .header("content-type", "application/json")
            .header("x-parley-user", user)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_as(path: &str, user: &str) -> Request<Body> {
        Request::get(path)
            .header("x-parley-user", user)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let app = app(None);
        let (status, body) = call(
            &app,
            Request::get("/profile").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("X-Parley-User"));
    }

    #[tokio::test]
    async fn api_key_guards_everything_but_health() {
        let app = app(Some("s3cret"));

        let (status, _) = call(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, get_as("/profile", "alice")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let wrong = Request::get("/metrics")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, wrong).await.0, StatusCode::FORBIDDEN);

        let right = Request::get("/metrics")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, right).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn query_answer_flow_over_http() {
        let app = app(None);
        for user in ["alice", "bob"] {
            let (status, _) = call(&app, post_json("/users", user, serde_json::json!({}))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, _) = call(
            &app,
            post_json(
                "/deposits",
                "alice",
                serde_json::json!({"amount": 1000, "source_token": "tok_visa"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, query) = call(
            &app,
            post_json(
                "/queries",
                "alice",
                serde_json::json!({"text": "Tea or coffee?", "regex": "tea|coffee", "bid": 25}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let query_id = query["id"].as_str().unwrap().to_string();

        let (status, served) = call(&app, get_as("/queries/next?min_bid=10", "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(served["id"], query_id.as_str());

        let (status, body) = call(
            &app,
            post_json(
                "/responses",
                "bob",
                serde_json::json!({"query_id": query_id, "text": "water"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "regex_mismatch");

        let (status, response) = call(
            &app,
            post_json(
                "/responses",
                "bob",
                serde_json::json!({"query_id": query_id, "text": "tea"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, get_as("/queries/next", "bob")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["retry"], true);

        let rating_path = format!("/responses/{}/rating", response["id"].as_str().unwrap());
        let (status, rating) = call(&app, get_as(&rating_path, "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rating, serde_json::Value::Null);

        let (status, _) = call(
            &app,
            post_json(
                "/ratings",
                "alice",
                serde_json::json!({"response_id": response["id"], "satisfactory": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, rating) = call(&app, get_as(&rating_path, "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rating["satisfactory"], true);
        assert_eq!(rating["rater_id"], "alice");

        let (status, _) = call(&app, get_as("/responses/nope/rating", "bob")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, profile) = call(&app, get_as("/profile", "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["balance"], 25);
    }

    #[tokio::test]
    async fn operations_endpoint_dispatches_tagged_json() {
        let app = app(None);
        let (status, body) = call(
            &app,
            post_json("/operations", "carol", serde_json::json!({"op": "register_user"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "profile");
        assert_eq!(body["result"]["user_id"], "carol");

        let (status, body) = call(
            &app,
            post_json(
                "/operations",
                "carol",
                serde_json::json!({"op": "payout", "amount": 100}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "payout_account_missing");
    }

    #[tokio::test]
    async fn attributes_round_trip_over_http() {
        let app = app(None);
        call(&app, post_json("/users", "dora", serde_json::json!({}))).await;
        let (status, _) = call(
            &app,
            post_json(
                "/attributes",
                "dora",
                serde_json::json!({"key": "lang", "value": "pt"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let delete = Request::delete("/attributes/lang")
            .header("x-parley-user", "dora")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, delete).await.0, StatusCode::OK);

        let (status, list) = call(&app, get_as("/attributes", "dora")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, serde_json::json!([]));
    }
}
