//! Payment orchestrator.
//!
//! Drives one `PaymentWorkflow` against the order backend, the checkout
//! widget and the cart store. Every stage runs strictly after the previous
//! one succeeded; the first failure ends the attempt. A new orchestrator is
//! needed for another try.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::api::OrderBackend;
use crate::cart::CartStore;
use crate::config::ClientConfig;
use crate::error::{CheckoutError, SubmissionError, TransitionError, WorkflowError};
use crate::gateway::{CheckoutOutcome, PaymentGateway};
use crate::payments::{CustomerDetails, OrderSummary, PaymentState, PaymentWorkflow};

pub const CONFIRMATION_MESSAGE: &str = "Your order will be delivered soon. Thanks for ordering!";

/// Messages surfaced to the customer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Draft rejected; the customer can fix it and submit again.
    Validation(String),
    Error(String),
    Confirmation(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

pub trait Navigator: Send + Sync {
    fn return_to_landing(&self);
}

pub struct PaymentOrchestrator {
    backend: Arc<dyn OrderBackend>,
    gateway: Arc<dyn PaymentGateway>,
    cart: CartStore,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    config: ClientConfig,
    workflow: PaymentWorkflow,
}

impl PaymentOrchestrator {
    /// Snapshots the cart now; later cart edits do not reach this attempt.
    pub fn new(
        backend: Arc<dyn OrderBackend>,
        gateway: Arc<dyn PaymentGateway>,
        cart: CartStore,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        config: ClientConfig,
    ) -> Self {
        let workflow = PaymentWorkflow::new(cart.load());
        PaymentOrchestrator {
            backend,
            gateway,
            cart,
            notifier,
            navigator,
            config,
            workflow,
        }
    }

    pub fn workflow(&self) -> &PaymentWorkflow {
        &self.workflow
    }

    pub fn state(&self) -> &PaymentState {
        self.workflow.state()
    }

    pub fn details_mut(&mut self) -> Result<&mut CustomerDetails, TransitionError> {
        self.workflow.details_mut()
    }

    pub fn summary(&self) -> Option<OrderSummary> {
        self.workflow.summary()
    }

    /// Run the whole attempt: validate, get a gateway handle, check out,
    /// submit the order, clear the cart, confirm and navigate home.
    pub async fn submit(&mut self) -> Result<(), WorkflowError> {
        let amount = match self.workflow.submit_details(Utc::now()) {
            Ok(amount) => amount,
            Err(WorkflowError::Validation(v)) => {
                self.notifier.notify(Notice::Validation(v.to_string()));
                return Err(v.into());
            }
            Err(e) => return Err(self.surface(e)),
        };

        let handle = self.backend.create_gateway_order(&amount).await;
        let options = self
            .workflow
            .gateway_handle_received(handle, &self.config)
            .map_err(|e| self.surface(e))?;

        if let Err(e) = self.gateway.ensure_loaded().await {
            // Widget load problems are logged, not shown.
            self.workflow.fail(e.to_string());
            return Err(e.into());
        }

        let outcome = match self.gateway.checkout(options).await {
            CheckoutOutcome::Paid(confirmation) => Ok(confirmation),
            CheckoutOutcome::Cancelled => Err(CheckoutError::Cancelled),
            CheckoutOutcome::Failed(reason) => Err(CheckoutError::Declined(reason)),
        };
        let submission = self
            .workflow
            .checkout_finished(outcome)
            .map_err(|e| self.surface(e))?;

        let result = match self.backend.submit_order(&submission).await {
            Ok(ack) => self
                .cart
                .clear()
                .map(|()| ack)
                .map_err(SubmissionError::CartNotCleared),
            Err(e) => Err(e),
        };
        self.workflow
            .submission_finished(result)
            .map_err(|e| self.surface(e))?;

        self.notifier
            .notify(Notice::Confirmation(CONFIRMATION_MESSAGE.to_string()));
        tokio::time::sleep(self.config.confirmation_delay).await;
        info!(workflow_id = %self.workflow.id(), "returning to landing");
        self.navigator.return_to_landing();
        Ok(())
    }

    fn surface(&self, e: WorkflowError) -> WorkflowError {
        self.notifier.notify(Notice::Error(e.to_string()));
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CART_KEY;
    use crate::error::{FetchError, GatewayHandleError};
    use crate::gateway::{CallbackGateway, CheckoutOptions, PaymentConfirmation};
    use crate::models::{LineItem, Order, OrderSubmission};
    use crate::storage::{KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBackend {
        fail_pay_with: Option<u16>,
        fail_submit: bool,
        pay_amounts: Mutex<Vec<String>>,
        submissions: Mutex<Vec<OrderSubmission>>,
    }

    #[async_trait]
    impl OrderBackend for FakeBackend {
        async fn fetch_orders(&self) -> Result<Vec<Order>, FetchError> {
            Ok(Vec::new())
        }

        async fn create_gateway_order(&self, amount: &str) -> Result<String, GatewayHandleError> {
            self.pay_amounts.lock().unwrap().push(amount.to_string());
            match self.fail_pay_with {
                Some(status) => Err(GatewayHandleError::Status {
                    status,
                    message: "Order backend server error".into(),
                }),
                None => Ok("order_TEST".into()),
            }
        }

        async fn submit_order(&self, submission: &OrderSubmission) -> Result<Value, SubmissionError> {
            if self.fail_submit {
                return Err(SubmissionError::Network("Cannot reach order backend".into()));
            }
            self.submissions.lock().unwrap().push(submission.clone());
            Ok(serde_json::json!({"message": "Order saved"}))
        }
    }

    struct ScriptedGateway {
        loaded: bool,
        outcome: CheckoutOutcome,
        opened: Mutex<Vec<CheckoutOptions>>,
    }

    impl ScriptedGateway {
        fn paying() -> Self {
            ScriptedGateway {
                loaded: true,
                outcome: CheckoutOutcome::Paid(PaymentConfirmation {
                    payment_id: "pay_1".into(),
                    ..Default::default()
                }),
                opened: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn ensure_loaded(&self) -> Result<(), CheckoutError> {
            if self.loaded {
                Ok(())
            } else {
                Err(CheckoutError::Unavailable("script failed to load".into()))
            }
        }

        async fn checkout(&self, options: CheckoutOptions) -> CheckoutOutcome {
            self.opened.lock().unwrap().push(options);
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        notices: Mutex<Vec<Notice>>,
        landings: AtomicUsize,
    }

    impl Notifier for Recorder {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    impl Navigator for Recorder {
        fn return_to_landing(&self) {
            self.landings.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        gateway: Arc<ScriptedGateway>,
        store: Arc<MemoryStore>,
        recorder: Arc<Recorder>,
        orchestrator: PaymentOrchestrator,
    }

    fn cart_json() -> &'static str {
        r#"[{"_id":"m1","name":"Paneer Tikka","price":125,"quantity":2}]"#
    }

    fn harness(backend: FakeBackend, gateway: ScriptedGateway) -> Harness {
        let backend = Arc::new(backend);
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryStore::new());
        store.set(CART_KEY, cart_json()).unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = ClientConfig {
            gateway_key: "rzp_test_key".into(),
            confirmation_delay: Duration::ZERO,
            ..ClientConfig::default()
        };
        let mut orchestrator = PaymentOrchestrator::new(
            backend.clone(),
            gateway.clone(),
            CartStore::new(store.clone()),
            recorder.clone(),
            recorder.clone(),
            config,
        );
        let d = orchestrator.details_mut().unwrap();
        d.name = "Ravi".into();
        d.mobile = "9123456780".into();
        d.table_number = "2".into();
        Harness {
            backend,
            gateway,
            store,
            recorder,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_successful_payment_submits_and_clears_cart() {
        let mut h = harness(FakeBackend::default(), ScriptedGateway::paying());
        h.orchestrator.submit().await.unwrap();

        assert_eq!(
            h.orchestrator.state(),
            &PaymentState::Completed {
                handle: "order_TEST".into()
            }
        );
        let submissions = h.backend.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].name, "Ravi");
        assert_eq!(submissions[0].table_number, "2");
        assert_eq!(submissions[0].products.len(), 1);
        assert!(h.store.get(CART_KEY).unwrap().is_none());
        assert_eq!(
            h.recorder.notices.lock().unwrap().as_slice(),
            [Notice::Confirmation(CONFIRMATION_MESSAGE.to_string())]
        );
        assert_eq!(h.recorder.landings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scenario_d_gateway_gets_minor_units() {
        let mut h = harness(FakeBackend::default(), ScriptedGateway::paying());
        h.orchestrator.submit().await.unwrap();

        assert_eq!(h.backend.pay_amounts.lock().unwrap().as_slice(), ["250.00"]);
        let opened = h.gateway.opened.lock().unwrap();
        assert_eq!(opened[0].amount, 25000);
        assert_eq!(opened[0].currency, "INR");
        assert_eq!(opened[0].order_id, "order_TEST");
    }

    #[tokio::test]
    async fn test_scenario_e_handle_failure_keeps_cart() {
        let backend = FakeBackend {
            fail_pay_with: Some(500),
            ..FakeBackend::default()
        };
        let mut h = harness(backend, ScriptedGateway::paying());
        let err = h.orchestrator.submit().await.unwrap_err();

        assert!(matches!(err, WorkflowError::GatewayHandle(_)));
        assert_eq!(h.orchestrator.state().name(), "Failed");
        assert_eq!(h.store.get(CART_KEY).unwrap().as_deref(), Some(cart_json()));
        assert!(h.backend.submissions.lock().unwrap().is_empty());
        assert!(h.gateway.opened.lock().unwrap().is_empty());
        assert!(matches!(
            h.recorder.notices.lock().unwrap().as_slice(),
            [Notice::Error(_)]
        ));
        assert_eq!(h.recorder.landings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_table_is_a_validation_notice() {
        let mut h = harness(FakeBackend::default(), ScriptedGateway::paying());
        h.orchestrator.details_mut().unwrap().table_number.clear();

        let err = h.orchestrator.submit().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(h.orchestrator.state(), &PaymentState::CollectingDetails);
        assert_eq!(
            h.recorder.notices.lock().unwrap().as_slice(),
            [Notice::Validation("Please enter a table number.".into())]
        );
        assert!(h.backend.pay_amounts.lock().unwrap().is_empty());

        // Fixing the draft lets the same attempt go through.
        h.orchestrator.details_mut().unwrap().table_number = "5".into();
        h.orchestrator.submit().await.unwrap();
    }

    #[tokio::test]
    async fn test_submission_failure_keeps_cart_and_is_terminal() {
        let backend = FakeBackend {
            fail_submit: true,
            ..FakeBackend::default()
        };
        let mut h = harness(backend, ScriptedGateway::paying());
        let err = h.orchestrator.submit().await.unwrap_err();

        assert!(matches!(err, WorkflowError::Submission(_)));
        assert!(matches!(
            h.orchestrator.state(),
            PaymentState::Failed { stage: "Submitting", .. }
        ));
        assert!(h.store.get(CART_KEY).unwrap().is_some());

        // The attempt cannot be reused.
        assert!(matches!(
            h.orchestrator.submit().await,
            Err(WorkflowError::Transition(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_checkout_fails_without_submitting() {
        let gateway = ScriptedGateway {
            outcome: CheckoutOutcome::Cancelled,
            ..ScriptedGateway::paying()
        };
        let mut h = harness(FakeBackend::default(), gateway);
        let err = h.orchestrator.submit().await.unwrap_err();

        assert!(matches!(err, WorkflowError::Checkout(CheckoutError::Cancelled)));
        assert!(h.backend.submissions.lock().unwrap().is_empty());
        assert!(h.store.get(CART_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_declined_checkout_maps_to_declined_error() {
        let gateway = ScriptedGateway {
            outcome: CheckoutOutcome::Failed("card declined".into()),
            ..ScriptedGateway::paying()
        };
        let mut h = harness(FakeBackend::default(), gateway);
        let err = h.orchestrator.submit().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            CheckoutError::Declined("card declined".into()).to_string()
        );
        assert!(matches!(
            err,
            WorkflowError::Checkout(CheckoutError::Declined(ref reason)) if reason == "card declined"
        ));
        assert!(matches!(
            h.orchestrator.state(),
            PaymentState::Failed { stage: "CheckoutInProgress", .. }
        ));
        assert!(h.backend.submissions.lock().unwrap().is_empty());
        assert!(h.store.get(CART_KEY).unwrap().is_some());
        assert!(matches!(
            h.recorder.notices.lock().unwrap().as_slice(),
            [Notice::Error(_)]
        ));
    }

    #[tokio::test]
    async fn test_overflowing_cart_fails_without_calling_backend() {
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                CART_KEY,
                r#"[{"_id":"m1","name":"Gold Plate","price":1e28,"quantity":10}]"#,
            )
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut orchestrator = PaymentOrchestrator::new(
            backend.clone(),
            Arc::new(ScriptedGateway::paying()),
            CartStore::new(store),
            recorder.clone(),
            recorder.clone(),
            ClientConfig::default(),
        );
        assert_eq!(orchestrator.state().name(), "Failed");

        let err = orchestrator.submit().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Transition(_)));
        assert!(backend.pay_amounts.lock().unwrap().is_empty());
        assert!(matches!(
            recorder.notices.lock().unwrap().as_slice(),
            [Notice::Error(_)]
        ));
    }

    #[tokio::test]
    async fn test_widget_load_failure_is_logged_not_shown() {
        let gateway = ScriptedGateway {
            loaded: false,
            ..ScriptedGateway::paying()
        };
        let mut h = harness(FakeBackend::default(), gateway);
        let err = h.orchestrator.submit().await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Checkout(CheckoutError::Unavailable(_))
        ));
        assert_eq!(h.orchestrator.state().name(), "Failed");
        assert!(h.recorder.notices.lock().unwrap().is_empty());
        assert!(h.gateway.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cart_snapshot_is_taken_at_start() {
        let mut h = harness(FakeBackend::default(), ScriptedGateway::paying());
        h.store
            .set(CART_KEY, r#"[{"_id":"late","name":"Extra","price":1}]"#)
            .unwrap();
        h.orchestrator.submit().await.unwrap();

        let submissions = h.backend.submissions.lock().unwrap();
        let products: Vec<&LineItem> = submissions[0].products.iter().collect();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].item_id, "m1");
    }

    #[tokio::test]
    async fn test_end_to_end_with_callback_gateway() {
        let (gateway, mut requests) = CallbackGateway::channel(1);
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(MemoryStore::new());
        store.set(CART_KEY, cart_json()).unwrap();
        let recorder = Arc::new(Recorder::default());
        let mut orchestrator = PaymentOrchestrator::new(
            backend.clone(),
            Arc::new(gateway),
            CartStore::new(store.clone()),
            recorder.clone(),
            recorder.clone(),
            ClientConfig {
                confirmation_delay: Duration::ZERO,
                ..ClientConfig::default()
            },
        );
        {
            let d = orchestrator.details_mut().unwrap();
            d.name = "Meera".into();
            d.mobile = "9000000001".into();
            d.table_number = "9".into();
        }

        let widget = tokio::spawn(async move {
            let req = requests.recv().await.expect("checkout opened");
            let amount = req.options.amount;
            let _ = req
                .respond_to
                .send(CheckoutOutcome::Paid(PaymentConfirmation::default()));
            amount
        });

        orchestrator.submit().await.unwrap();
        assert_eq!(widget.await.unwrap(), 25000);
        assert_eq!(backend.submissions.lock().unwrap().len(), 1);
        assert!(store.get(CART_KEY).unwrap().is_none());
    }
}
