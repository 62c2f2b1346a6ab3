//! # Dispatcher-Facing HTTP API
//!
//! Builds the axum router the chat-command dispatcher calls into. Every
//! ledger operation maps to one endpoint; every response carries a single
//! user-facing `message` the dispatcher forwards unmodified — never a
//! partial result.
//!
//! | Method | Path                     | Description                     |
//! |--------|--------------------------|---------------------------------|
//! | GET    | `/health`                | Liveness probe                  |
//! | GET    | `/status`                | Service status summary          |
//! | GET    | `/accounts/:id/balance`  | Account balance and binding     |
//! | POST   | `/verify`                | Bind an address to an identity  |
//! | POST   | `/transfer`              | Tip another member              |
//! | POST   | `/withdraw`              | Request (or confirm) a payout   |
//! | POST   | `/withdraw/confirm`      | Confirm the pending payout      |
//! | POST   | `/admin/credit`          | External deposit path           |
//!
//! Validation failures answer 200 with `ok: false` — from the
//! dispatcher's point of view a rejection is a normal outcome with a
//! message to relay. Only operational faults (daemon down, storage
//! broken, reconciliation required) use 5xx.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use satchel_ledger::config::COIN_TICKER;
use satchel_ledger::{AccountId, Amount, Ledger, LedgerError, WithdrawOutcome};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    /// The ledger core.
    pub ledger: Arc<Ledger>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// When this process started serving.
    pub started_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wire Types
// ---------------------------------------------------------------------------

/// The envelope every mutating endpoint answers with.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiReply {
    /// Whether the operation committed.
    pub ok: bool,
    /// The single user-facing line for the dispatcher to relay.
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub identity: String,
    pub address: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub sender: String,
    pub recipient: String,
    /// Coin-denominated decimal string, e.g. `"1.5"`.
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub identity: String,
    /// Coin-denominated decimal string.
    pub amount: String,
    /// Execute immediately instead of parking a pending request.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub identity: String,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub identity: String,
    /// Coin-denominated decimal string.
    pub amount: String,
}

/// Response payload for `GET /accounts/:id/balance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub identity: String,
    /// Decimal rendering with full precision.
    pub balance: String,
    /// Raw grain count.
    pub grains: u64,
    /// Grains staged for an in-flight payout.
    pub withheld_grains: u64,
    pub verified_address: Option<String>,
    pub frozen: bool,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub ticker: String,
    pub accounts: usize,
    pub total_grains: u64,
    pub pending_withdrawals: usize,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the dispatcher-facing router with tracing and CORS applied.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/accounts/:id/balance", get(balance))
        .route("/verify", post(verify))
        .route("/transfer", post(transfer))
        .route("/withdraw", post(withdraw))
        .route("/withdraw/confirm", post(confirm_withdraw))
        .route("/admin/credit", post(credit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Turns a ledger failure into the HTTP answer the dispatcher sees.
fn reply_error(state: &AppState, err: &LedgerError) -> (StatusCode, Json<ApiReply>) {
    if err.is_user_error() {
        state.metrics.rejections_total.inc();
        tracing::debug!(error = %err, "request rejected");
    } else {
        tracing::error!(error = %err, "operation failed");
    }
    if matches!(err, LedgerError::Inconsistency { .. }) {
        state.metrics.reconciliations_required_total.inc();
    }

    let status = match err {
        LedgerError::Daemon(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Store(_) | LedgerError::Inconsistency { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::OK,
    };
    (
        status,
        Json(ApiReply {
            ok: false,
            message: err.user_message(),
        }),
    )
}

fn reply_ok(message: String) -> (StatusCode, Json<ApiReply>) {
    (StatusCode::OK, Json(ApiReply { ok: true, message }))
}

fn parse_amount(input: &str) -> Result<Amount, LedgerError> {
    Ok(Amount::parse_decimal(input)?)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let total_grains = state.ledger.store().total_grains().unwrap_or_else(|e| {
        tracing::error!(error = %e, "total_grains failed");
        0
    });
    Json(StatusResponse {
        version: state.version.clone(),
        ticker: COIN_TICKER.to_string(),
        accounts: state.ledger.store().account_count(),
        total_grains,
        pending_withdrawals: state.ledger.pending_withdrawal_count(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

async fn balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ApiReply>)> {
    let identity = AccountId::from(id);
    match state.ledger.account_of(&identity) {
        Ok(Some(acct)) => Ok(Json(BalanceResponse {
            identity: identity.to_string(),
            balance: acct.balance.to_decimal_string(),
            grains: acct.balance.grains(),
            withheld_grains: acct.withheld.grains(),
            verified_address: acct.verified_address,
            frozen: acct.frozen,
        })),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiReply {
                ok: false,
                message: LedgerError::NoAccount { identity }.user_message(),
            }),
        )),
        Err(err) => Err(reply_error(&state, &err)),
    }
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let identity = AccountId::from(req.identity);

    match state
        .ledger
        .verify_address(&identity, &req.address, &req.signature)
        .await
    {
        Ok(outcome) => {
            state.metrics.verifications_total.inc();
            reply_ok(outcome.message())
        }
        Err(err) => reply_error(&state, &err),
    }
}

async fn transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let sender = AccountId::from(req.sender);
    let recipient = AccountId::from(req.recipient);

    let result = match parse_amount(&req.amount) {
        Ok(amount) => state.ledger.transfer(&sender, &recipient, amount).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            state.metrics.transfers_total.inc();
            reply_ok(outcome.message())
        }
        Err(err) => reply_error(&state, &err),
    }
}

async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let identity = AccountId::from(req.identity);

    let result = match parse_amount(&req.amount) {
        Ok(amount) => state.ledger.withdraw(&identity, amount, req.confirm).await,
        Err(err) => Err(err),
    };
    finish_withdrawal(&state, result)
}

async fn confirm_withdraw(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let identity = AccountId::from(req.identity);

    let result = state.ledger.confirm_withdrawal(&identity).await;
    finish_withdrawal(&state, result)
}

/// Shared tail of the two withdrawal endpoints: metric accounting plus
/// the gauge refresh, then the reply.
fn finish_withdrawal(
    state: &AppState,
    result: Result<WithdrawOutcome, LedgerError>,
) -> (StatusCode, Json<ApiReply>) {
    let reply = match result {
        Ok(outcome) => {
            match outcome {
                WithdrawOutcome::Pending { .. } => {
                    state.metrics.withdrawal_requests_total.inc()
                }
                WithdrawOutcome::Paid { .. } => state.metrics.payouts_total.inc(),
            }
            reply_ok(outcome.message())
        }
        Err(err) => {
            if matches!(err, LedgerError::Daemon(_)) {
                state.metrics.payout_failures_total.inc();
            }
            reply_error(state, &err)
        }
    };
    state
        .metrics
        .pending_withdrawals
        .set(state.ledger.pending_withdrawal_count() as i64);
    reply
}

async fn credit(
    State(state): State<AppState>,
    Json(req): Json<CreditRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let identity = AccountId::from(req.identity);

    let result = match parse_amount(&req.amount) {
        Ok(amount) => state.ledger.credit(&identity, amount).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(new_balance) => reply_ok(format!(
            "Credited {identity}. Balance is now {new_balance}."
        )),
        Err(err) => reply_error(&state, &err),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ServiceMetrics;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use satchel_ledger::daemon::{DaemonError, WalletRpc};
    use satchel_ledger::AccountStore;

    /// Daemon that accepts everything and pays out instantly.
    struct YesDaemon;

    #[async_trait]
    impl WalletRpc for YesDaemon {
        async fn validate_address(&self, _address: &str) -> Result<bool, DaemonError> {
            Ok(true)
        }

        async fn verify_message(
            &self,
            _address: &str,
            _signature: &str,
            _message: &str,
        ) -> Result<bool, DaemonError> {
            Ok(true)
        }

        async fn send_many(
            &self,
            _amounts: &[(String, Amount)],
            _min_confirmations: u32,
            _comment: &str,
        ) -> Result<String, DaemonError> {
            Ok("feedface".to_string())
        }
    }

    fn test_state() -> AppState {
        let store = Arc::new(AccountStore::open_temporary().expect("temp store"));
        AppState {
            version: "test".to_string(),
            ledger: Arc::new(Ledger::new(store, Arc::new(YesDaemon))),
            metrics: Arc::new(ServiceMetrics::new()),
            started_at: Utc::now(),
        }
    }

    async fn post_json(router: Router, path: &str, body: serde_json::Value) -> (StatusCode, ApiReply) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let reply: ApiReply = serde_json::from_slice(&bytes).expect("json reply");
        (status, reply)
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn verify_returns_the_binding_message() {
        let router = create_router(test_state());
        let (status, reply) = post_json(
            router,
            "/verify",
            serde_json::json!({ "identity": "42", "address": "addrA", "signature": "sig" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(reply.ok);
        assert!(reply.message.contains("addrA"));
    }

    #[tokio::test]
    async fn transfer_rejection_carries_the_user_message() {
        let state = test_state();
        let router = create_router(state.clone());

        // No account, no funds: the dispatcher still gets a clean message.
        let (status, reply) = post_json(
            router,
            "/transfer",
            serde_json::json!({ "sender": "1", "recipient": "2", "amount": "1.0" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(!reply.ok);
        assert!(reply.message.contains("verify"));
        assert_eq!(state.metrics.rejections_total.get(), 1);
    }

    #[tokio::test]
    async fn malformed_amount_is_a_rejection_not_a_fault() {
        let router = create_router(test_state());
        let (status, reply) = post_json(
            router,
            "/transfer",
            serde_json::json!({ "sender": "1", "recipient": "2", "amount": "1.2.3" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn credit_then_balance_roundtrip() {
        let state = test_state();
        let router = create_router(state.clone());

        let (status, reply) = post_json(
            router.clone(),
            "/admin/credit",
            serde_json::json!({ "identity": "42", "amount": "2.5" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.ok);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/accounts/42/balance")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: BalanceResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.balance, "2.50000000");
        assert_eq!(body.grains, 250_000_000);
        assert!(!body.frozen);
    }

    #[tokio::test]
    async fn balance_of_unknown_identity_is_not_found() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/accounts/999/balance")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn withdraw_flow_over_http() {
        let state = test_state();
        let router = create_router(state.clone());

        post_json(
            router.clone(),
            "/verify",
            serde_json::json!({ "identity": "42", "address": "addrA", "signature": "sig" }),
        )
        .await;
        post_json(
            router.clone(),
            "/admin/credit",
            serde_json::json!({ "identity": "42", "amount": "5" }),
        )
        .await;

        let (_, reply) = post_json(
            router.clone(),
            "/withdraw",
            serde_json::json!({ "identity": "42", "amount": "1.0" }),
        )
        .await;
        assert!(reply.ok);
        assert!(reply.message.contains("confirm"));
        assert_eq!(state.metrics.pending_withdrawals.get(), 1);

        let (_, reply) = post_json(
            router.clone(),
            "/withdraw/confirm",
            serde_json::json!({ "identity": "42" }),
        )
        .await;
        assert!(reply.ok);
        assert!(reply.message.contains("feedface"));
        assert_eq!(state.metrics.pending_withdrawals.get(), 0);
        assert_eq!(state.metrics.payouts_total.get(), 1);

        // Nothing left to confirm.
        let (status, reply) = post_json(
            router,
            "/withdraw/confirm",
            serde_json::json!({ "identity": "42" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!reply.ok);
        assert!(reply.message.contains("pending"));
    }
}
