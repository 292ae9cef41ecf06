//! Order submission: one backend record per cart unit.
//!
//! Units are sent sequentially and share one timestamp. The first failure
//! stops the loop; units already sent stay sent.

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use crate::cart::MAX_LINE_QUANTITY;
use crate::client::OrderBackend;
use crate::error::CafeError;
use crate::identity::UserIdentity;
use crate::models::{generate_order_id, CartItem, Order};

/// Outcome of a submission that sent every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    pub timestamp: String,
    pub order_ids: Vec<String>,
    pub total_price: i64,
}

/// A submission that stopped part way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitFailure {
    pub error: CafeError,
    pub units_sent: usize,
    pub units_total: usize,
}

impl std::fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.units_sent == 0 {
            write!(f, "{}", self.error)
        } else {
            write!(
                f,
                "{} ({} of {} items were sent)",
                self.error, self.units_sent, self.units_total
            )
        }
    }
}

/// Current time as ISO-8601 with millisecond precision.
pub fn order_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Expand cart lines into one order per unit.
pub fn orders_for_cart(identity: &UserIdentity, lines: &[CartItem], timestamp: &str) -> Vec<Order> {
    lines
        .iter()
        .flat_map(|line| (0..line.quantity).map(move |_| line))
        .map(|line| Order {
            order_id: generate_order_id(),
            timestamp: timestamp.to_string(),
            user_id: identity.user_id.clone(),
            nickname: identity.nickname.clone(),
            animal: identity.animal.clone(),
            item: line.name.clone(),
            price: line.price,
            completed: false,
        })
        .collect()
}

/// Send every unit of `lines` for `identity`.
pub async fn submit_cart<B: OrderBackend>(
    backend: &B,
    identity: Option<&UserIdentity>,
    lines: &[CartItem],
) -> Result<SubmitReport, SubmitFailure> {
    let units_total = lines
        .iter()
        .map(|l| l.quantity as usize)
        .fold(0, usize::saturating_add);
    let reject = |msg: &str| SubmitFailure {
        error: CafeError::Validation(msg.to_string()),
        units_sent: 0,
        units_total,
    };
    let identity = identity.ok_or_else(|| reject("Set a nickname before ordering"))?;
    if units_total == 0 {
        return Err(reject("Cart is empty"));
    }
    if lines.iter().any(|l| l.quantity > MAX_LINE_QUANTITY) {
        return Err(reject(&format!(
            "At most {MAX_LINE_QUANTITY} of one item per order"
        )));
    }

    let timestamp = order_timestamp();
    let orders = orders_for_cart(identity, lines, &timestamp);
    let mut order_ids = Vec::with_capacity(orders.len());

    for order in &orders {
        if let Err(error) = backend.add_order(order).await {
            warn!(
                user_id = %identity.user_id,
                units_sent = order_ids.len(),
                units_total,
                error = %error,
                "order submission stopped"
            );
            return Err(SubmitFailure {
                error,
                units_sent: order_ids.len(),
                units_total,
            });
        }
        order_ids.push(order.order_id.clone());
    }

    let total_price = orders.iter().map(|o| o.price).fold(0, i64::saturating_add);
    info!(user_id = %identity.user_id, units = units_total, total_price, "order submitted");
    Ok(SubmitReport {
        timestamp,
        order_ids,
        total_price,
    })
}
