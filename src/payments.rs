//! Payment submission state machine.
//!
//! `PaymentWorkflow` is a plain value with one method per event. It never
//! performs I/O: callers feed it the results of backend and gateway calls
//! and it answers with what to do next (the amount to request, the checkout
//! options, the order to submit). `checkout::PaymentOrchestrator` is the
//! async driver that wires it to real collaborators.
//!
//! ```text
//! CollectingDetails -> AwaitingGatewayHandle -> CheckoutInProgress
//!                   -> Submitting -> Completed
//! any non-terminal  -> Failed
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::cart::cart_total;
use crate::config::ClientConfig;
use crate::error::{
    CheckoutError, GatewayHandleError, SubmissionError, TransitionError, ValidationError,
    WorkflowError,
};
use crate::gateway::{CheckoutOptions, PaymentConfirmation, Prefill, Theme};
use crate::models::{LineItem, OrderSubmission};

pub const MIN_TABLE: u8 = 1;
pub const MAX_TABLE: u8 = 10;
const MOBILE_DIGITS: usize = 10;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Two-decimal string the backend expects, e.g. `250` -> `"250.00"`.
pub fn format_amount(amount: Decimal) -> String {
    let mut fixed = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    fixed.rescale(2);
    fixed.to_string()
}

/// Gateway minor units: `round(amount × 100)`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

// ---------------------------------------------------------------------------
// Customer details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerDetails {
    pub name: String,
    pub mobile: String,
    pub table_number: String,
}

impl CustomerDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let table = self.table_number.trim();
        if table.is_empty() {
            return Err(ValidationError::MissingTable);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        let mobile = self.mobile.trim();
        if mobile.is_empty() {
            return Err(ValidationError::MissingMobile);
        }
        if mobile.len() != MOBILE_DIGITS || !mobile.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidMobile);
        }
        match table.parse::<u8>() {
            Ok(n) if (MIN_TABLE..=MAX_TABLE).contains(&n) => Ok(()),
            _ => Err(ValidationError::TableOutOfRange {
                min: MIN_TABLE,
                max: MAX_TABLE,
            }),
        }
    }
}

/// What the customer reviews before paying.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub submitted_at: DateTime<Utc>,
    pub name: String,
    pub mobile: String,
    pub table_number: String,
    pub total: String,
    pub items: Vec<LineItem>,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentState {
    CollectingDetails,
    AwaitingGatewayHandle {
        submitted_at: DateTime<Utc>,
    },
    CheckoutInProgress {
        submitted_at: DateTime<Utc>,
        handle: String,
    },
    Submitting {
        submitted_at: DateTime<Utc>,
        handle: String,
    },
    Completed {
        handle: String,
    },
    Failed {
        stage: &'static str,
        reason: String,
    },
}

impl PaymentState {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentState::CollectingDetails => "CollectingDetails",
            PaymentState::AwaitingGatewayHandle { .. } => "AwaitingGatewayHandle",
            PaymentState::CheckoutInProgress { .. } => "CheckoutInProgress",
            PaymentState::Submitting { .. } => "Submitting",
            PaymentState::Completed { .. } => "Completed",
            PaymentState::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Completed { .. } | PaymentState::Failed { .. }
        )
    }

    fn submitted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PaymentState::AwaitingGatewayHandle { submitted_at }
            | PaymentState::CheckoutInProgress { submitted_at, .. }
            | PaymentState::Submitting { submitted_at, .. } => Some(*submitted_at),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// One checkout attempt. Not reusable once it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct PaymentWorkflow {
    id: Uuid,
    details: CustomerDetails,
    cart: Vec<LineItem>,
    total: Decimal,
    state: PaymentState,
}

impl PaymentWorkflow {
    /// Start collecting details over a cart snapshot taken once, here.
    /// A cart whose total cannot be represented starts out `Failed`.
    pub fn new(cart: Vec<LineItem>) -> Self {
        let id = Uuid::new_v4();
        let mut workflow = PaymentWorkflow {
            id,
            details: CustomerDetails::default(),
            cart,
            total: Decimal::ZERO,
            state: PaymentState::CollectingDetails,
        };
        match cart_total(&workflow.cart) {
            Some(total) => {
                workflow.total = total;
                info!(workflow_id = %id, items = workflow.cart.len(), total = %total, "payment workflow started");
            }
            None => workflow.fail("cart total is out of range"),
        }
        workflow
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &PaymentState {
        &self.state
    }

    pub fn details(&self) -> &CustomerDetails {
        &self.details
    }

    pub fn cart_items(&self) -> &[LineItem] {
        &self.cart
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn formatted_total(&self) -> String {
        format_amount(self.total)
    }

    /// Draft fields are editable only while collecting details.
    pub fn details_mut(&mut self) -> Result<&mut CustomerDetails, TransitionError> {
        match self.state {
            PaymentState::CollectingDetails => Ok(&mut self.details),
            _ => Err(self.reject("edit details")),
        }
    }

    /// Summary shown once details are accepted.
    pub fn summary(&self) -> Option<OrderSummary> {
        let submitted_at = self.state.submitted_at()?;
        Some(OrderSummary {
            submitted_at,
            name: self.details.name.clone(),
            mobile: self.details.mobile.clone(),
            table_number: self.details.table_number.clone(),
            total: self.formatted_total(),
            items: self.cart.clone(),
        })
    }

    /// Customer pressed submit. On success returns the amount string for the
    /// gateway handle request. Validation failures leave the state alone.
    pub fn submit_details(&mut self, now: DateTime<Utc>) -> Result<String, WorkflowError> {
        if self.state != PaymentState::CollectingDetails {
            return Err(self.reject("submit details").into());
        }
        self.details.validate()?;

        self.state = PaymentState::AwaitingGatewayHandle { submitted_at: now };
        info!(
            workflow_id = %self.id,
            table = %self.details.table_number,
            amount = %self.formatted_total(),
            "details accepted, requesting gateway order"
        );
        Ok(self.formatted_total())
    }

    /// Backend answered the gateway handle request. On success returns the
    /// options to launch checkout with.
    pub fn gateway_handle_received(
        &mut self,
        result: Result<String, GatewayHandleError>,
        config: &ClientConfig,
    ) -> Result<CheckoutOptions, WorkflowError> {
        let PaymentState::AwaitingGatewayHandle { submitted_at } = self.state else {
            return Err(self.reject("accept a gateway handle").into());
        };
        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        let Some(amount) = to_minor_units(self.total) else {
            let e = GatewayHandleError::Malformed(format!(
                "amount {} does not fit in minor units",
                self.total
            ));
            self.fail(e.to_string());
            return Err(e.into());
        };

        let options = CheckoutOptions {
            key: config.gateway_key.clone(),
            amount,
            currency: config.currency.clone(),
            name: config
                .merchant_name
                .clone()
                .unwrap_or_else(|| self.details.name.clone()),
            description: config.description.clone(),
            order_id: handle.clone(),
            prefill: Prefill {
                name: self.details.name.clone(),
                email: config.prefill_email.clone(),
                contact: self.details.mobile.clone(),
            },
            theme: Theme {
                color: config.theme_color.clone(),
            },
        };

        info!(workflow_id = %self.id, gateway_order = %handle, amount, "launching checkout");
        self.state = PaymentState::CheckoutInProgress {
            submitted_at,
            handle,
        };
        Ok(options)
    }

    /// The widget finished. On a payment returns the order to submit.
    pub fn checkout_finished(
        &mut self,
        result: Result<PaymentConfirmation, CheckoutError>,
    ) -> Result<OrderSubmission, WorkflowError> {
        let PaymentState::CheckoutInProgress {
            submitted_at,
            handle,
        } = &self.state
        else {
            return Err(self.reject("finish checkout").into());
        };
        let (submitted_at, handle) = (*submitted_at, handle.clone());

        let confirmation = match result {
            Ok(c) => c,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        let submission = OrderSubmission {
            name: self.details.name.trim().to_string(),
            mobile: self.details.mobile.trim().to_string(),
            table_number: self.details.table_number.trim().to_string(),
            amount: self.formatted_total(),
            products: self.cart.clone(),
            order_id: handle.clone(),
            order_date: submitted_at,
        };

        info!(
            workflow_id = %self.id,
            gateway_order = %handle,
            payment_id = %confirmation.payment_id,
            "payment confirmed, submitting order"
        );
        self.state = PaymentState::Submitting {
            submitted_at,
            handle,
        };
        Ok(submission)
    }

    /// The backend answered the order submission (and, on success, the cart
    /// has been cleared by the caller).
    pub fn submission_finished(
        &mut self,
        result: Result<Value, SubmissionError>,
    ) -> Result<(), WorkflowError> {
        let PaymentState::Submitting { handle, .. } = &self.state else {
            return Err(self.reject("finish submission").into());
        };
        let handle = handle.clone();

        match result {
            Ok(ack) => {
                info!(workflow_id = %self.id, gateway_order = %handle, ack = %ack, "order completed");
                self.state = PaymentState::Completed { handle };
                Ok(())
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Move to `Failed` from any non-terminal state. Terminal states stay put.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let stage = self.state.name();
        let reason = reason.into();
        error!(workflow_id = %self.id, stage, reason = %reason, "payment workflow failed");
        self.state = PaymentState::Failed { stage, reason };
    }

    fn reject(&self, event: &'static str) -> TransitionError {
        TransitionError {
            state: self.state.name(),
            event,
        }
    }
}
