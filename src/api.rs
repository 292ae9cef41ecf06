//! Spreadsheet script API client.
//!
//! Thin HTTP layer over the script web-app endpoint. Reads are `GET` with
//! `action`/`sheetId` query parameters; writes are `POST` with a JSON body
//! carrying the action name. Responses are returned as raw JSON so the proxy
//! can pass them through unchanged.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::SheetTarget;
use crate::envelope::{self, Access};
use crate::error::CafeError;

pub const ACTION_GET_MENU: &str = "getMenu";
pub const ACTION_GET_ORDERS: &str = "getOrders";
pub const ACTION_ADD_ORDER: &str = "addOrder";
pub const ACTION_UPDATE_ORDER_STATUS: &str = "updateOrderStatus";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

fn ensure_scheme(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
        format!("http://{url}")
    } else {
        format!("https://{url}")
    }
}

/// Normalise the script URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_script_url(url: &str) -> String {
    let mut url = ensure_scheme(url);
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Normalise a proxy base URL:
/// - ensure a scheme is present
/// - strip trailing slashes
/// - strip a trailing `/api` segment (endpoint paths add it back)
pub fn normalize_proxy_url(url: &str) -> String {
    let mut url = normalize_script_url(url);
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }
    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly transport error.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> CafeError {
    if err.is_connect() {
        return CafeError::Transport(format!("Cannot reach {url}"));
    }
    if err.is_timeout() {
        return CafeError::Transport(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return CafeError::Config(format!("Invalid URL: {url}"));
    }
    CafeError::Transport(format!("Network error communicating with {url}: {err}"))
}

fn log_upstream(action: &str, status: StatusCode, started: Instant) {
    let latency_ms = started.elapsed().as_millis() as u64;
    if status.is_success() {
        debug!(action, status = status.as_u16(), latency_ms, "script call completed");
    } else {
        warn!(action, status = status.as_u16(), latency_ms, "script call failed");
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the spreadsheet script. Cheap to clone.
#[derive(Clone)]
pub struct ScriptClient {
    client: Client,
}

impl ScriptClient {
    pub fn new(timeout: Duration) -> Result<Self, CafeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CafeError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// `GET <script>?action=<action>&sheetId=<sheet>`
    pub async fn read(&self, target: &SheetTarget, action: &str) -> Result<Value, CafeError> {
        let started = Instant::now();
        let resp = self
            .client
            .get(&target.script_url)
            .query(&[("action", action), ("sheetId", target.sheet_id.as_str())])
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| friendly_error(&target.script_url, &e))?;

        let status = resp.status();
        log_upstream(action, status, started);
        let body = resp.text().await.unwrap_or_default();
        envelope::decode_body(status, &body, Access::Read)
    }

    /// `POST <script>` with `{ action, sheetId, ...fields }`.
    pub async fn write(
        &self,
        target: &SheetTarget,
        action: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<Value, CafeError> {
        let mut body = serde_json::Map::new();
        body.insert("action".into(), Value::String(action.to_string()));
        body.insert("sheetId".into(), Value::String(target.sheet_id.clone()));
        body.extend(fields);

        let started = Instant::now();
        let resp = self
            .client
            .post(&target.script_url)
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| friendly_error(&target.script_url, &e))?;

        let status = resp.status();
        log_upstream(action, status, started);
        let body = resp.text().await.unwrap_or_default();
        envelope::decode_body(status, &body, Access::Write)
    }
}
