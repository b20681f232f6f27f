//! Error taxonomy for the ordering client.
//!
//! Every stage of the payment workflow has its own error type so callers
//! can tell which step failed. All of them are terminal to the operation in
//! progress; nothing here is retried automatically.

use thiserror::Error;

/// Failure reading or writing the injected key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value store backend error: {0}")]
    Backend(String),
    #[error("stored value under '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Retrieving the order list from the backend failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Network(String),
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("Invalid order list from backend: {0}")]
    Malformed(String),
}

/// Obtaining the payment-gateway order handle failed.
#[derive(Debug, Error)]
pub enum GatewayHandleError {
    #[error("{0}")]
    Network(String),
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("Invalid payment order response: {0}")]
    Malformed(String),
}

/// The checkout widget could not run the payment to completion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("payment widget is not available: {0}")]
    Unavailable(String),
    #[error("payment was cancelled by the customer")]
    Cancelled,
    #[error("payment gateway reported a failure: {0}")]
    Declined(String),
}

/// Persisting the order failed after payment succeeded.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Network(String),
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("Invalid order acknowledgment: {0}")]
    Malformed(String),
    #[error("order saved but the cart could not be cleared: {0}")]
    CartNotCleared(#[source] StoreError),
}

/// Draft details rejected before any network call. User-facing, not fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a table number.")]
    MissingTable,
    #[error("Table number must be between {min} and {max}")]
    TableOutOfRange { min: u8, max: u8 },
    #[error("Please enter your name.")]
    MissingName,
    #[error("Please enter your mobile number.")]
    MissingMobile,
    #[error("Mobile number must be exactly 10 digits")]
    InvalidMobile,
}

/// An event arrived in a state that does not accept it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {event} while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for setting '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Anything that can stop a payment workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    GatewayHandle(#[from] GatewayHandleError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}
