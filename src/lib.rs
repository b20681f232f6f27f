//! Table ordering client.
//!
//! Two halves that never share memory:
//!
//! - [`orders::OrderReconciler`] is the staff view. It loads the order list
//!   from the backend, patches delivery status from a local override cache
//!   and keeps delivered orders at the bottom.
//! - [`checkout::PaymentOrchestrator`] is the customer checkout. It drives
//!   [`payments::PaymentWorkflow`] from customer details through the payment
//!   gateway to a saved order and an empty cart.
//!
//! Both talk to the backend through [`api::OrderBackend`] and persist
//! through the injected [`storage::KeyValueStore`].

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod models;
pub mod orders;
pub mod payments;
pub mod storage;

pub use api::{HttpBackend, OrderBackend};
pub use cart::CartStore;
pub use checkout::{Navigator, Notice, Notifier, PaymentOrchestrator};
pub use config::ClientConfig;
pub use error::{
    CheckoutError, FetchError, GatewayHandleError, StoreError, SubmissionError, ValidationError,
    WorkflowError,
};
pub use gateway::{CallbackGateway, CheckoutOutcome, PaymentGateway};
pub use models::{LineItem, Order, OrderStatus};
pub use orders::OrderReconciler;
pub use payments::{PaymentState, PaymentWorkflow};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
