//! Menu, order and cart records, plus positional decoding of spreadsheet rows.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const ORDER_ID_SUFFIX_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: i64,
    pub stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

impl MenuItem {
    /// Decode `[name, price, stockFlag, category, creator]`. Returns `None`
    /// for rows without a name or with a non-positive price.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        let name = cell_str(row, 0);
        let price = cell_int(row, 1);
        if name.is_empty() || price <= 0 {
            return None;
        }
        Some(Self {
            name,
            price,
            stock: cell_flag(row, 2),
            category: non_empty(cell_str(row, 3)),
            creator: non_empty(cell_str(row, 4)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub timestamp: String,
    pub user_id: String,
    pub nickname: String,
    pub animal: String,
    pub item: String,
    pub price: i64,
    #[serde(default)]
    pub completed: bool,
}

impl Order {
    /// Decode `[orderId, timestamp, userId, nickname, animal, item, price,
    /// completedFlag]`. Rows missing any key column are dropped.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        let order = Self {
            order_id: cell_str(row, 0),
            timestamp: cell_str(row, 1),
            user_id: cell_str(row, 2),
            nickname: cell_str(row, 3),
            animal: cell_str(row, 4),
            item: cell_str(row, 5),
            price: cell_int(row, 6),
            completed: cell_flag(row, 7),
        };
        if order.order_id.is_empty()
            || order.timestamp.is_empty()
            || order.user_id.is_empty()
            || order.item.is_empty()
            || order.price <= 0
        {
            return None;
        }
        Some(order)
    }

    /// Positional row in the same column order `from_row` reads.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::String(self.order_id.clone()),
            Value::String(self.timestamp.clone()),
            Value::String(self.user_id.clone()),
            Value::String(self.nickname.clone()),
            Value::String(self.animal.clone()),
            Value::String(self.item.clone()),
            Value::from(self.price),
            Value::Bool(self.completed),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

impl CartItem {
    /// Price times quantity, saturating at `i64::MAX`.
    pub fn line_total(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.quantity))
    }
}

/// Body of `POST /api/orders/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: String,
    pub completed: bool,
}

/// `order_<unix-millis>_<7 base-36 chars>`
pub fn generate_order_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let bytes = Uuid::new_v4().into_bytes();
    let mut seed = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    let mut suffix = String::with_capacity(ORDER_ID_SUFFIX_LEN);
    for _ in 0..ORDER_ID_SUFFIX_LEN {
        let digit = (seed % 36) as u32;
        seed /= 36;
        suffix.push(char::from_digit(digit, 36).unwrap_or('0'));
    }
    format!("order_{millis}_{suffix}")
}

// ---------------------------------------------------------------------------
// Cell helpers
// ---------------------------------------------------------------------------

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn cell_str(row: &[Value], idx: usize) -> String {
    match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn cell_int(row: &[Value], idx: usize) -> i64 {
    row.get(idx).map(parse_int_lenient).unwrap_or(0)
}

fn cell_flag(row: &[Value], idx: usize) -> bool {
    match row.get(idx) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Integer from a spreadsheet cell: numbers are truncated, strings yield
/// their leading integer prefix (`"450円"` is 450), anything else is 0.
pub fn parse_int_lenient(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let trimmed = s.trim();
            let (negative, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            };
            let prefix: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            match prefix.parse::<i64>() {
                Ok(n) if negative => -n,
                Ok(n) => n,
                Err(_) => 0,
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Vec<Value> {
        v.as_array().cloned().unwrap()
    }

    #[test]
    fn test_menu_row_decoding() {
        let item = MenuItem::from_row(&row(json!(["Latte", "450", "TRUE", "ソフトドリンク", "mika"])))
            .unwrap();
        assert_eq!(item.name, "Latte");
        assert_eq!(item.price, 450);
        assert!(item.stock);
        assert_eq!(item.category.as_deref(), Some("ソフトドリンク"));
        assert_eq!(item.creator.as_deref(), Some("mika"));
    }

    #[test]
    fn test_menu_row_without_optional_columns() {
        let item = MenuItem::from_row(&row(json!(["Toast", 300, false]))).unwrap();
        assert!(!item.stock);
        assert_eq!(item.category, None);
        assert_eq!(item.creator, None);
    }

    #[test]
    fn test_menu_row_rejects_free_or_unnamed_items() {
        assert!(MenuItem::from_row(&row(json!(["", 300, true]))).is_none());
        assert!(MenuItem::from_row(&row(json!(["Water", 0, true]))).is_none());
        assert!(MenuItem::from_row(&row(json!(["Water", "free", true]))).is_none());
    }

    #[test]
    fn test_order_row_decoding_defaults_completed() {
        let order = Order::from_row(&row(json!([
            "order_1_abc",
            "2026-10-16T09:00:00.000Z",
            "mika_ねこ",
            "mika",
            "🐱 ねこ",
            "Latte",
            450
        ])))
        .unwrap();
        assert_eq!(order.order_id, "order_1_abc");
        assert_eq!(order.price, 450);
        assert!(!order.completed);
    }

    #[test]
    fn test_order_completed_flag_variants() {
        let base = json!(["o1", "t", "u", "n", "a", "i", 100]);
        for (flag, expected) in [
            (json!(true), true),
            (json!("true"), true),
            (json!("TRUE"), true),
            (json!(false), false),
            (json!("false"), false),
            (json!(""), false),
        ] {
            let mut r = row(base.clone());
            r.push(flag.clone());
            assert_eq!(
                Order::from_row(&r).unwrap().completed,
                expected,
                "flag {flag}"
            );
        }
    }

    #[test]
    fn test_order_row_rejects_incomplete_rows() {
        assert!(Order::from_row(&row(json!(["", "t", "u", "n", "a", "i", 100]))).is_none());
        assert!(Order::from_row(&row(json!(["o", "", "u", "n", "a", "i", 100]))).is_none());
        assert!(Order::from_row(&row(json!(["o", "t", "u", "n", "a", "", 100]))).is_none());
        assert!(Order::from_row(&row(json!(["o", "t", "u", "n", "a", "i", 0]))).is_none());
    }

    #[test]
    fn test_order_json_is_camel_case() {
        let order = Order::from_row(&row(json!(["o1", "t", "u", "n", "a", "i", 100, true]))).unwrap();
        let v = serde_json::to_value(&order).unwrap();
        assert_eq!(v["orderId"], "o1");
        assert_eq!(v["userId"], "u");
        assert_eq!(v["completed"], true);
    }

    #[test]
    fn test_order_to_row_matches_from_row() {
        let order = Order::from_row(&row(json!(["o1", "t", "u", "n", "a", "i", 100, true]))).unwrap();
        assert_eq!(Order::from_row(&order.to_row()), Some(order));
    }

    #[test]
    fn test_parse_int_lenient() {
        assert_eq!(parse_int_lenient(&json!(450)), 450);
        assert_eq!(parse_int_lenient(&json!(450.9)), 450);
        assert_eq!(parse_int_lenient(&json!(" 450円 ")), 450);
        assert_eq!(parse_int_lenient(&json!("-5")), -5);
        assert_eq!(parse_int_lenient(&json!("abc")), 0);
        assert_eq!(parse_int_lenient(&json!(null)), 0);
    }

    #[test]
    fn test_generated_order_ids_are_unique_and_shaped() {
        let a = generate_order_id();
        let b = generate_order_id();
        assert_ne!(a, b);
        let parts: Vec<&str> = a.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "order");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ORDER_ID_SUFFIX_LEN);
    }

    #[test]
    fn test_cart_line_total() {
        let line = CartItem {
            name: "Latte".into(),
            price: 450,
            quantity: 3,
        };
        assert_eq!(line.line_total(), 1350);
    }

    #[test]
    fn test_line_total_saturates_on_spreadsheet_sized_prices() {
        let price = parse_int_lenient(&json!("4611686018427387904"));
        let line = CartItem {
            name: "Gold".into(),
            price,
            quantity: 2,
        };
        assert_eq!(line.line_total(), i64::MAX);
    }
}
