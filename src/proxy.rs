//! HTTP proxy in front of the spreadsheet script.
//!
//! Stateless pass-through: each request resolves its sheet from [`Config`],
//! forwards to the script and relays the JSON answer. Configuration gaps,
//! upstream failures and malformed bodies become `{success:false, error}`
//! envelopes with a matching status code.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::api::{
    ScriptClient, ACTION_ADD_ORDER, ACTION_GET_MENU, ACTION_GET_ORDERS,
    ACTION_UPDATE_ORDER_STATUS,
};
use crate::config::{Config, Sheet};
use crate::error::CafeError;

pub struct ProxyState {
    pub config: Config,
    script: ScriptClient,
}

impl ProxyState {
    pub fn new(config: Config) -> Result<Arc<Self>, CafeError> {
        let script = ScriptClient::new(config.upstream_timeout)?;
        Ok(Arc::new(Self { config, script }))
    }
}

type Reply = Result<Json<Value>, CafeError>;

fn log_failure(route: &str, err: &CafeError) {
    match err {
        CafeError::Validation(_) => warn!(route, error = %err, "rejected request"),
        _ => error!(route, error = %err, "proxy request failed"),
    }
}

fn parse_json_body(body: &Bytes) -> Result<Value, CafeError> {
    serde_json::from_slice::<Value>(body)
        .map_err(|e| CafeError::Validation(format!("Malformed payload: {e}")))
}

/// JavaScript-style truthiness, except that the string `"false"` is false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => {
            let s = s.trim();
            !s.is_empty() && !s.eq_ignore_ascii_case("false")
        }
        Some(_) => true,
    }
}

async fn read_sheet(state: &ProxyState, sheet: Sheet, action: &str) -> Reply {
    let target = state.config.sheet_target(sheet)?;
    let value = state.script.read(&target, action).await?;
    Ok(Json(value))
}

pub async fn menu_handler(State(state): State<Arc<ProxyState>>) -> Reply {
    read_sheet(&state, Sheet::Menu, ACTION_GET_MENU)
        .await
        .inspect_err(|e| log_failure("GET /api/menu", e))
}

pub async fn list_orders_handler(State(state): State<Arc<ProxyState>>) -> Reply {
    read_sheet(&state, Sheet::Orders, ACTION_GET_ORDERS)
        .await
        .inspect_err(|e| log_failure("GET /api/orders", e))
}

pub async fn add_order_handler(State(state): State<Arc<ProxyState>>, body: Bytes) -> Reply {
    let result = async {
        let target = state.config.sheet_target(Sheet::Orders)?;
        let order = parse_json_body(&body)?;

        let mut fields = Map::new();
        fields.insert("data".into(), order);
        let value = state
            .script
            .write(&target, ACTION_ADD_ORDER, fields)
            .await?;
        Ok::<_, CafeError>(Json(value))
    }
    .await;
    result.inspect_err(|e| log_failure("POST /api/orders", e))
}

pub async fn update_order_handler(State(state): State<Arc<ProxyState>>, body: Bytes) -> Reply {
    let result = async {
        let target = state.config.sheet_target(Sheet::Orders)?;
        let payload = parse_json_body(&body)?;

        let order_id = payload
            .get("orderId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CafeError::Validation("orderId is required".into()))?;
        let completed = truthy(payload.get("completed"));

        let mut fields = Map::new();
        fields.insert("orderId".into(), Value::String(order_id.to_string()));
        fields.insert("completed".into(), Value::Bool(completed));
        let value = state
            .script
            .write(&target, ACTION_UPDATE_ORDER_STATUS, fields)
            .await?;
        info!(order_id, completed, "order status forwarded");
        Ok::<_, CafeError>(Json(value))
    }
    .await;
    result.inspect_err(|e| log_failure("POST /api/orders/update", e))
}

pub fn router(state: Arc<ProxyState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::DELETE,
            Method::PATCH,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/menu", get(menu_handler))
        .route("/api/orders", get(list_orders_handler).post(add_order_handler))
        .route("/api/orders/update", post(update_order_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the proxy on an already-bound listener until `shutdown` resolves.
pub async fn serve_on<F>(listener: TcpListener, state: Arc<ProxyState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener
        .local_addr()
        .context("listener has no local address")?;
    info!("Proxy running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("proxy server error")?;

    info!("Proxy shut down");
    Ok(())
}

/// Bind the configured address and serve until Ctrl+C / SIGTERM.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let address = config.listen_address();
    let state = ProxyState::new(config)?;

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    serve_on(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
