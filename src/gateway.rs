//! Payment gateway checkout capability.
//!
//! The checkout widget lives in the UI layer. `CallbackGateway` bridges it:
//! each checkout is sent to the UI over a channel together with a one-shot
//! responder, and the workflow waits until the widget answers. A dropped
//! responder means the widget was closed without paying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::CheckoutError;

/// Options handed to the checkout widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOptions {
    pub key: String,
    /// Minor units (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub order_id: String,
    pub prefill: Prefill,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prefill {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    pub color: String,
}

/// Payload of the widget's success callback. Only its arrival matters to
/// the workflow; the fields are kept for logging.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(alias = "razorpay_payment_id", default)]
    pub payment_id: String,
    #[serde(alias = "razorpay_order_id", default)]
    pub order_id: String,
    #[serde(alias = "razorpay_signature", default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Paid(PaymentConfirmation),
    Cancelled,
    Failed(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fails when the checkout widget could not be loaded.
    async fn ensure_loaded(&self) -> Result<(), CheckoutError>;

    /// Open the checkout and wait for the customer to finish. No timeout.
    async fn checkout(&self, options: CheckoutOptions) -> CheckoutOutcome;
}

// ---------------------------------------------------------------------------
// Channel bridge to the UI widget
// ---------------------------------------------------------------------------

/// A checkout the UI must open. Answer through `respond_to`.
#[derive(Debug)]
pub struct CheckoutRequest {
    pub options: CheckoutOptions,
    pub respond_to: oneshot::Sender<CheckoutOutcome>,
}

#[derive(Clone)]
pub struct CallbackGateway {
    sender: mpsc::Sender<CheckoutRequest>,
}

impl CallbackGateway {
    /// Gateway plus the receiving end the UI layer listens on.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<CheckoutRequest>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (CallbackGateway { sender }, receiver)
    }
}

#[async_trait]
impl PaymentGateway for CallbackGateway {
    async fn ensure_loaded(&self) -> Result<(), CheckoutError> {
        if self.sender.is_closed() {
            return Err(CheckoutError::Unavailable(
                "checkout widget is not listening".into(),
            ));
        }
        Ok(())
    }

    async fn checkout(&self, options: CheckoutOptions) -> CheckoutOutcome {
        let (respond_to, response) = oneshot::channel();
        let order_id = options.order_id.clone();
        if self
            .sender
            .send(CheckoutRequest {
                options,
                respond_to,
            })
            .await
            .is_err()
        {
            warn!(gateway_order = %order_id, "checkout widget went away before opening");
            return CheckoutOutcome::Failed("checkout widget is not listening".into());
        }
        debug!(gateway_order = %order_id, "checkout opened, waiting for customer");
        response.await.unwrap_or(CheckoutOutcome::Cancelled)
    }
}
