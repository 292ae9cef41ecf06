//! In-process stand-in for the spreadsheet script, served by axum on an
//! ephemeral port. Test-only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{Config, ENV_MENU_SHEET_ID, ENV_ORDER_SHEET_ID, ENV_SCRIPT_URL};
use crate::models::Order;

pub const MENU_SHEET: &str = "menu-sheet";
pub const ORDER_SHEET: &str = "order-sheet";

const REDIRECT_PAGE: &str = "<HTML><HEAD><TITLE>Moved Temporarily</TITLE></HEAD>\
<BODY><A HREF=\"https://script.googleusercontent.com/macros/echo\">here</A></BODY></HTML>";

#[derive(Default)]
pub struct FakeScript {
    pub menu: Mutex<Vec<Value>>,
    pub orders: Mutex<Vec<Value>>,
    /// Received POST bodies, in order.
    pub writes: Mutex<Vec<Value>>,
    /// Answer writes with an HTML redirect page instead of JSON.
    pub html_writes: AtomicBool,
    /// Answer reads with an HTML page instead of JSON.
    pub html_reads: AtomicBool,
    /// Force every response to this HTTP status.
    pub fail_status: Mutex<Option<u16>>,
    /// Answer every request with `{success:false, error}`.
    pub reject_with: Mutex<Option<String>>,
}

impl FakeScript {
    pub fn with_menu(rows: Vec<Value>) -> Arc<Self> {
        let script = Self::default();
        *script.menu.lock().unwrap() = rows;
        Arc::new(script)
    }

    fn forced_failure(&self) -> Option<Response> {
        if let Some(code) = *self.fail_status.lock().unwrap() {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Some((status, "upstream exploded").into_response());
        }
        if let Some(error) = self.reject_with.lock().unwrap().clone() {
            return Some(Json(json!({ "success": false, "error": error })).into_response());
        }
        None
    }
}

async fn script_get(
    State(script): State<Arc<FakeScript>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(resp) = script.forced_failure() {
        return resp;
    }
    if script.html_reads.load(Ordering::SeqCst) {
        return Html(REDIRECT_PAGE).into_response();
    }
    let sheet = params.get("sheetId").map(String::as_str).unwrap_or_default();
    match (params.get("action").map(String::as_str), sheet) {
        (Some("getMenu"), MENU_SHEET) => {
            let rows = script.menu.lock().unwrap().clone();
            Json(json!({ "success": true, "data": rows })).into_response()
        }
        (Some("getOrders"), ORDER_SHEET) => {
            let rows = script.orders.lock().unwrap().clone();
            Json(json!({ "success": true, "data": rows })).into_response()
        }
        _ => Json(json!({ "success": false, "error": "Invalid action" })).into_response(),
    }
}

async fn script_post(State(script): State<Arc<FakeScript>>, Json(body): Json<Value>) -> Response {
    script.writes.lock().unwrap().push(body.clone());
    if let Some(resp) = script.forced_failure() {
        return resp;
    }

    let reply = match body.get("action").and_then(Value::as_str) {
        Some("addOrder") => match serde_json::from_value::<Order>(body["data"].clone()) {
            Ok(order) => {
                let row = Value::Array(order.to_row());
                script.orders.lock().unwrap().push(row.clone());
                json!({ "success": true, "message": "Order added successfully", "data": row })
            }
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        },
        Some("updateOrderStatus") => {
            let order_id = body["orderId"].as_str().unwrap_or_default().to_string();
            let completed = body["completed"].as_bool().unwrap_or(false);
            let mut orders = script.orders.lock().unwrap();
            match orders.iter_mut().find(|row| row[0] == order_id.as_str()) {
                Some(row) => {
                    if let Some(cells) = row.as_array_mut() {
                        cells.resize(8, Value::Null);
                        cells[7] = Value::Bool(completed);
                    }
                    json!({ "success": true, "message": "Order status updated" })
                }
                None => json!({ "success": false, "error": "Order not found" }),
            }
        }
        _ => json!({ "success": false, "error": "Invalid action" }),
    };

    if script.html_writes.load(Ordering::SeqCst) && reply["success"] == true {
        return Html(REDIRECT_PAGE).into_response();
    }
    Json(reply).into_response()
}

/// Serve `app` on 127.0.0.1 with an ephemeral port; returns the base URL.
pub async fn spawn_router(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Start the fake script; returns its URL.
pub async fn spawn_fake_script(script: Arc<FakeScript>) -> String {
    let app = Router::new()
        .route("/exec", get(script_get).post(script_post))
        .with_state(script);
    format!("{}/exec", spawn_router(app).await)
}

/// A proxy config pointing at `script_url` with both sheets configured.
pub fn config_for(script_url: &str) -> Config {
    let script_url = script_url.to_string();
    Config::from_lookup(move |key| match key {
        ENV_SCRIPT_URL => Some(script_url.clone()),
        ENV_MENU_SHEET_ID => Some(MENU_SHEET.to_string()),
        ENV_ORDER_SHEET_ID => Some(ORDER_SHEET.to_string()),
        _ => None,
    })
}
