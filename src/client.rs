//! Client side of the proxy contract.
//!
//! [`MenuSource`] and [`OrderBackend`] are the seams the catalog, submission
//! and sync engine depend on; [`HttpBackend`] implements both over HTTP.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{friendly_error, normalize_proxy_url};
use crate::envelope::{self, Access, Envelope};
use crate::error::CafeError;
use crate::models::{MenuItem, Order, StatusUpdate};

/// Default timeout for proxy requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MENU_PATH: &str = "/api/menu";
const ORDERS_PATH: &str = "/api/orders";
const ORDER_UPDATE_PATH: &str = "/api/orders/update";

pub trait MenuSource: Send + Sync {
    fn fetch_menu(&self) -> impl Future<Output = Result<Vec<MenuItem>, CafeError>> + Send;
}

pub trait OrderBackend: Send + Sync {
    /// Full order list, invalid rows dropped.
    fn fetch_orders(&self) -> impl Future<Output = Result<Vec<Order>, CafeError>> + Send;

    /// Create one order record.
    fn add_order(&self, order: &Order) -> impl Future<Output = Result<(), CafeError>> + Send;

    fn update_order_status(
        &self,
        order_id: &str,
        completed: bool,
    ) -> impl Future<Output = Result<(), CafeError>> + Send;
}

/// Decode a menu envelope. An empty or missing row set is an error, as is a
/// row set where no row survives validation.
pub fn menu_from_envelope(envelope: &Envelope) -> Result<Vec<MenuItem>, CafeError> {
    let rows = envelope.rows();
    if rows.is_empty() {
        return Err(CafeError::Backend(
            "No menu data found. Add menu rows to the menu sheet.".into(),
        ));
    }
    let items: Vec<MenuItem> = rows.iter().filter_map(|r| MenuItem::from_row(r)).collect();
    if items.is_empty() {
        return Err(CafeError::Backend(
            "No valid menu data found. Check the name and price columns.".into(),
        ));
    }
    Ok(items)
}

/// Decode an order envelope. Missing data means no orders yet.
pub fn orders_from_envelope(envelope: &Envelope) -> Vec<Order> {
    envelope
        .rows()
        .iter()
        .filter_map(|r| Order::from_row(r))
        .collect()
}

#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, CafeError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, CafeError> {
        let base_url = normalize_proxy_url(base_url);
        if base_url.trim_start_matches("https://").trim_start_matches("http://").is_empty() {
            return Err(CafeError::Config("proxy URL is empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CafeError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Envelope, CafeError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        envelope::decode(status, &body, Access::Read)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope, CafeError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        envelope::decode(status, &body, Access::Write)
    }
}

impl MenuSource for HttpBackend {
    async fn fetch_menu(&self) -> Result<Vec<MenuItem>, CafeError> {
        let envelope = self
            .get(MENU_PATH)
            .await
            .inspect_err(|e| warn!(error = %e, "menu fetch failed"))?;
        let items = menu_from_envelope(&envelope)?;
        debug!(count = items.len(), "menu fetched");
        Ok(items)
    }
}

impl OrderBackend for HttpBackend {
    async fn fetch_orders(&self) -> Result<Vec<Order>, CafeError> {
        let envelope = self
            .get(ORDERS_PATH)
            .await
            .inspect_err(|e| warn!(error = %e, "order fetch failed"))?;
        let orders = orders_from_envelope(&envelope);
        debug!(count = orders.len(), "orders fetched");
        Ok(orders)
    }

    async fn add_order(&self, order: &Order) -> Result<(), CafeError> {
        self.post(ORDERS_PATH, order)
            .await
            .inspect_err(|e| warn!(order_id = %order.order_id, error = %e, "order add failed"))?;
        info!(order_id = %order.order_id, item = %order.item, "order added");
        Ok(())
    }

    async fn update_order_status(&self, order_id: &str, completed: bool) -> Result<(), CafeError> {
        let body = StatusUpdate {
            order_id: order_id.to_string(),
            completed,
        };
        self.post(ORDER_UPDATE_PATH, &body)
            .await
            .inspect_err(|e| warn!(order_id, error = %e, "order status update failed"))?;
        info!(order_id, completed, "order status updated");
        Ok(())
    }
}
