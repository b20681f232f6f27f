//! Order data model and the JSON shapes exchanged with the order backend.
//!
//! Field names on the wire follow the backend (`_id`, `products`,
//! `tableNumber`, ...); the Rust names describe what the fields mean.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Delivery status. Transitions only `Pending -> Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Delivered,
}

impl OrderStatus {
    /// Anything other than "delivered" (any case) is still pending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("delivered") {
            OrderStatus::Delivered
        } else {
            OrderStatus::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Delivered => "Delivered",
        }
    }

    pub fn is_delivered(self) -> bool {
        self == OrderStatus::Delivered
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(OrderStatus::parse).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One cart entry, copied verbatim into the order at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "_id", alias = "id", default)]
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        rename = "price",
        default,
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "lenient_decimal"
    )]
    pub unit_price: Decimal,
    #[serde(default = "default_quantity", deserialize_with = "quantity_or_one")]
    pub quantity: u32,
}

impl LineItem {
    /// `None` when `price × quantity` does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

fn default_quantity() -> u32 {
    1
}

/// Positive whole numbers, as JSON numbers or numeric strings. Anything
/// else (missing, null, zero, negative, fractional, text) is one unit.
fn quantity_or_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|q| u32::try_from(q).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    Ok(raw.filter(|q| *q > 0).unwrap_or(1))
}

/// Numbers or numeric strings, including exponent notation. Unreadable
/// amounts are zero so one bad field does not drop the whole order list.
fn lenient_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    };
    Ok(parsed.unwrap_or_default())
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A persisted order as returned by `GET /getOrders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "name", default)]
    pub customer_name: String,
    #[serde(rename = "mobile", default)]
    pub mobile_number: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub table_number: String,
    #[serde(rename = "products", default)]
    pub line_items: Vec<LineItem>,
    #[serde(default, alias = "amount", deserialize_with = "lenient_decimal")]
    pub total_amount: Decimal,
    #[serde(
        rename = "date",
        alias = "orderDate",
        default,
        deserialize_with = "lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(rename = "orderId", default, skip_serializing_if = "Option::is_none")]
    pub gateway_order_handle: Option<String>,
}

impl Order {
    pub fn is_delivered(&self) -> bool {
        self.status.is_delivered()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Accept RFC 3339 strings or epoch milliseconds; anything else is unknown.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Backend payloads
// ---------------------------------------------------------------------------

/// Body of `POST /pay`.
#[derive(Debug, Clone, Serialize)]
pub struct PayRequest {
    pub amount: String,
}

/// Response of `POST /pay`: the gateway-side order handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrder {
    pub order_id: String,
}

/// Body of `POST /submitOrder`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    pub name: String,
    pub mobile: String,
    pub table_number: String,
    pub amount: String,
    pub products: Vec<LineItem>,
    pub order_id: String,
    pub order_date: DateTime<Utc>,
}
