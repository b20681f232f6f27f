//! Order backend API client.
//!
//! Three endpoints: `GET /getOrders`, `POST /pay` (gateway order handle) and
//! `POST /submitOrder`. The `OrderBackend` trait is the seam the reconciler
//! and the payment orchestrator depend on; `HttpBackend` is the reqwest
//! implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{normalize_backend_url, ClientConfig};
use crate::error::{FetchError, GatewayHandleError, SubmissionError};
use crate::models::{GatewayOrder, Order, OrderSubmission, PayRequest};

const ORDERS_PATH: &str = "/getOrders";
const PAY_PATH: &str = "/pay";
const SUBMIT_PATH: &str = "/submitOrder";

#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Every order the backend knows about, in backend order.
    async fn fetch_orders(&self) -> Result<Vec<Order>, FetchError>;

    /// Ask the backend to open a gateway-side order for `amount`
    /// (two-decimal string) and return its handle.
    async fn create_gateway_order(&self, amount: &str) -> Result<String, GatewayHandleError>;

    /// Persist a paid order. Returns the backend acknowledgment.
    async fn submit_order(&self, submission: &OrderSubmission) -> Result<Value, SubmissionError>;
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Transport-level outcome shared by all three endpoints before it is mapped
/// into the endpoint's own error type.
#[derive(Debug)]
enum HttpFailure {
    Network(String),
    Status { status: u16, message: String },
    Malformed(String),
}

impl From<HttpFailure> for FetchError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Network(m) => FetchError::Network(m),
            HttpFailure::Status { status, message } => FetchError::Status { status, message },
            HttpFailure::Malformed(m) => FetchError::Malformed(m),
        }
    }
}

impl From<HttpFailure> for GatewayHandleError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Network(m) => GatewayHandleError::Network(m),
            HttpFailure::Status { status, message } => {
                GatewayHandleError::Status { status, message }
            }
            HttpFailure::Malformed(m) => GatewayHandleError::Malformed(m),
        }
    }
}

impl From<HttpFailure> for SubmissionError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Network(m) => SubmissionError::Network(m),
            HttpFailure::Status { status, message } => SubmissionError::Status { status, message },
            HttpFailure::Malformed(m) => SubmissionError::Malformed(m),
        }
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach order backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid order backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        404 => "Order backend endpoint not found".to_string(),
        s if s >= 500 => "Order backend server error".to_string(),
        _ => "Unexpected response from order backend".to_string(),
    }
}

/// Prefer the backend's own `error` / `message` field when it sends one.
fn status_message(status: StatusCode, body_text: &str) -> String {
    serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| status_error(status))
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(HttpBackend {
            base_url: normalize_backend_url(&config.backend_url),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, HttpFailure> {
        let full_url = format!("{}{path}", self.base_url);
        let mut req = self
            .client
            .request(method.clone(), &full_url)
            .header("Accept", "application/json");
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HttpFailure::Network(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(%method, path, status = status.as_u16(), "order backend returned an error");
            return Err(HttpFailure::Status {
                status: status.as_u16(),
                message: status_message(status, &body_text),
            });
        }

        debug!(%method, path, status = status.as_u16(), "order backend request ok");

        // Empty 2xx bodies are a valid acknowledgment.
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| HttpFailure::Malformed(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl OrderBackend for HttpBackend {
    async fn fetch_orders(&self) -> Result<Vec<Order>, FetchError> {
        let body = self
            .request::<()>(Method::GET, ORDERS_PATH, None, None)
            .await?;
        let orders: Vec<Order> =
            serde_json::from_value(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        info!(count = orders.len(), "fetched orders");
        Ok(orders)
    }

    async fn create_gateway_order(&self, amount: &str) -> Result<String, GatewayHandleError> {
        let payload = PayRequest {
            amount: amount.to_string(),
        };
        let body = self
            .request(Method::POST, PAY_PATH, Some(&payload), None)
            .await?;
        let order: GatewayOrder = serde_json::from_value(body)
            .map_err(|e| GatewayHandleError::Malformed(e.to_string()))?;
        if order.order_id.trim().is_empty() {
            return Err(GatewayHandleError::Malformed("empty orderId".into()));
        }
        info!(gateway_order = %order.order_id, amount, "gateway order created");
        Ok(order.order_id)
    }

    async fn submit_order(&self, submission: &OrderSubmission) -> Result<Value, SubmissionError> {
        let ack = self
            .request(
                Method::POST,
                SUBMIT_PATH,
                Some(submission),
                Some(&submission.order_id),
            )
            .await?;
        info!(gateway_order = %submission.order_id, "order saved");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> HttpBackend {
        let config = ClientConfig {
            backend_url: server.uri(),
            ..ClientConfig::default()
        };
        HttpBackend::new(&config).expect("client")
    }

    #[tokio::test]
    async fn test_fetch_orders_parses_backend_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"_id": "1", "status": "Pending", "products": []},
                {"_id": "2", "status": "Delivered", "products": []}
            ])))
            .mount(&server)
            .await;

        let orders = backend_for(&server).fetch_orders().await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, "1");
        assert!(orders[1].is_delivered());
    }

    #[tokio::test]
    async fn test_fetch_orders_non_2xx_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getOrders"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "db down"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server).fetch_orders().await.unwrap_err();
        match err {
            FetchError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "db down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_orders_rejects_non_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .mount(&server)
            .await;

        let err = backend_for(&server).fetch_orders().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_create_gateway_order_sends_formatted_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pay"))
            .and(body_json(serde_json::json!({"amount": "250.00"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"orderId": "order_Nx1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let handle = backend_for(&server)
            .create_gateway_order("250.00")
            .await
            .unwrap();
        assert_eq!(handle, "order_Nx1");
    }

    #[tokio::test]
    async fn test_create_gateway_order_missing_handle_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .create_gateway_order("10.00")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayHandleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_submit_order_carries_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submitOrder"))
            .and(header("Idempotency-Key", "order_Nx1"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"saved": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let submission = OrderSubmission {
            name: "Asha".into(),
            mobile: "9876543210".into(),
            table_number: "3".into(),
            amount: "250.00".into(),
            products: vec![],
            order_id: "order_Nx1".into(),
            order_date: Utc::now(),
        };
        let ack = backend_for(&server).submit_order(&submission).await.unwrap();
        assert_eq!(ack["saved"], true);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let config = ClientConfig {
            backend_url: "http://127.0.0.1:1".into(),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        let err = backend.fetch_orders().await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn test_status_message_prefers_backend_text() {
        assert_eq!(
            status_message(StatusCode::BAD_REQUEST, r#"{"message":"bad table"}"#),
            "bad table"
        );
        assert_eq!(
            status_message(StatusCode::NOT_FOUND, "<html>"),
            "Order backend endpoint not found"
        );
    }
}
