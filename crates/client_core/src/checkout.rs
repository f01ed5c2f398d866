//! Payment checkout controller.
//!
//! Creates a payment intent, configures the payment sheet and asks the UI to
//! present it, then waits for the sheet's result to arrive on the payment
//! bus. The bus result re-enters the controller as an ordinary intent, so it
//! is serialized with everything the UI dispatches.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    api::PaymentRepository,
    error::ClientError,
    payment::{
        PaymentBus, PaymentConfig, PaymentOutcome, PaymentResult, PaymentSheet, SheetConfig,
    },
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutFailure {
    Create(ClientError),
    Configure(String),
    Payment(String),
}

impl CheckoutFailure {
    fn message(&self) -> String {
        match self {
            Self::Create(error) => format!("Could not start checkout: {error}"),
            Self::Configure(reason) => format!("Payment setup failed: {reason}"),
            Self::Payment(reason) => format!("Payment failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    Idle,
    Creating {
        order: CheckoutOrder,
        attempt: u64,
    },
    Presenting {
        order: CheckoutOrder,
        client_secret: String,
        config: SheetConfig,
    },
    AwaitingResult {
        order: CheckoutOrder,
        client_secret: String,
    },
    Completed {
        order: CheckoutOrder,
        client_secret: String,
    },
    Canceled {
        order: CheckoutOrder,
        client_secret: String,
    },
    Failed {
        order: CheckoutOrder,
        failure: CheckoutFailure,
    },
}

impl CheckoutState {
    /// An attempt that still owns the payment sheet.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Creating { .. } | Self::Presenting { .. } | Self::AwaitingResult { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Canceled { .. } | Self::Failed { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum CheckoutIntent {
    Checkout { amount: f64, currency: String },
    /// The UI handed the secret to the payment sheet.
    SheetPresented,
    /// Gives up on the current attempt so a new `Checkout` is accepted.
    Abandon,
    /// Sheet result forwarded from the payment bus.
    PaymentResult(PaymentResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEffect {
    Present {
        client_secret: String,
        config: SheetConfig,
    },
    Outcome(PaymentOutcome),
    ShowMessage(String),
}

#[derive(Debug)]
pub enum CheckoutOutcome {
    IntentCreated {
        attempt: u64,
        result: Result<PaymentConfig, CheckoutFailure>,
    },
}

pub struct CheckoutReducer {
    repository: Arc<dyn PaymentRepository>,
    sheet: Arc<dyn PaymentSheet>,
    merchant_display_name: String,
    attempts: AtomicU64,
}

impl CheckoutReducer {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        sheet: Arc<dyn PaymentSheet>,
        merchant_display_name: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            sheet,
            merchant_display_name: merchant_display_name.into(),
            attempts: AtomicU64::new(0),
        }
    }

    fn checkout(&self, state: &CheckoutState, order: CheckoutOrder) -> Transition<Self> {
        if state.is_in_flight() {
            let conflict = ClientError::StateConflict(format!(
                "checkout of {} {}",
                order.amount, order.currency
            ));
            debug!(error = %conflict, "ignoring duplicate checkout");
            return Transition::unchanged();
        }
        if let Some(field) = invalid_order_field(&order) {
            let failure = CheckoutFailure::Create(ClientError::Validation { field });
            let message = failure.message();
            return Transition::to(CheckoutState::Failed { order, failure })
                .with_effect(CheckoutEffect::ShowMessage(message));
        }

        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        info!(amount = order.amount, currency = %order.currency, attempt, "starting checkout");

        let repository = Arc::clone(&self.repository);
        let sheet = Arc::clone(&self.sheet);
        let merchant = self.merchant_display_name.clone();
        let request = order.clone();
        Transition::to(CheckoutState::Creating { order, attempt }).with_work(async move {
            let result = async {
                let response = repository
                    .create_payment_intent(request.amount, &request.currency)
                    .await
                    .map_err(|err| CheckoutFailure::Create(ClientError::network(&err)))?;
                let config = PaymentConfig::from_intent(response, &merchant);
                // Credentials are process-wide and must be in place before the
                // sheet is presented.
                sheet
                    .configure(&config.publishable_key)
                    .map_err(|err| CheckoutFailure::Configure(format!("{err:#}")))?;
                Ok::<_, CheckoutFailure>(config)
            }
            .await;
            CheckoutOutcome::IntentCreated { attempt, result }
        })
    }

    fn payment_result(&self, state: &CheckoutState, result: PaymentResult) -> Transition<Self> {
        let PaymentResult {
            client_secret: reported_secret,
            outcome,
        } = result;
        let (order, client_secret) = match state {
            CheckoutState::Presenting {
                order,
                client_secret,
                ..
            }
            | CheckoutState::AwaitingResult {
                order,
                client_secret,
            } => (order.clone(), client_secret.clone()),
            _ => {
                debug!(?outcome, "payment result without a presented sheet ignored");
                return Transition::unchanged();
            }
        };
        if reported_secret != client_secret {
            debug!(?outcome, "payment result for another presentation ignored");
            return Transition::unchanged();
        }

        info!(?outcome, "payment finished");
        let next = match &outcome {
            PaymentOutcome::Completed => CheckoutState::Completed {
                order,
                client_secret,
            },
            PaymentOutcome::Canceled => CheckoutState::Canceled {
                order,
                client_secret,
            },
            PaymentOutcome::Failed(reason) => CheckoutState::Failed {
                order,
                failure: CheckoutFailure::Payment(reason.clone()),
            },
        };
        Transition::to(next).with_effect(CheckoutEffect::Outcome(outcome))
    }
}

fn invalid_order_field(order: &CheckoutOrder) -> Option<&'static str> {
    // Charged in whole units.
    if !order.amount.is_finite() || order.amount.round() < 1.0 {
        Some("amount")
    } else if order.currency.trim().is_empty() {
        Some("currency")
    } else {
        None
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Intent = CheckoutIntent;
    type Outcome = CheckoutOutcome;
    type Effect = CheckoutEffect;

    fn on_intent(&self, state: &CheckoutState, intent: CheckoutIntent) -> Transition<Self> {
        match intent {
            CheckoutIntent::Checkout { amount, currency } => {
                self.checkout(state, CheckoutOrder { amount, currency })
            }
            CheckoutIntent::SheetPresented => match state {
                CheckoutState::Presenting {
                    order,
                    client_secret,
                    ..
                } => Transition::to(CheckoutState::AwaitingResult {
                    order: order.clone(),
                    client_secret: client_secret.clone(),
                }),
                _ => Transition::unchanged(),
            },
            CheckoutIntent::Abandon => {
                if matches!(state, CheckoutState::Idle) {
                    Transition::unchanged()
                } else {
                    info!("checkout abandoned");
                    Transition::to(CheckoutState::Idle)
                }
            }
            CheckoutIntent::PaymentResult(result) => self.payment_result(state, result),
        }
    }

    fn on_outcome(&self, state: &CheckoutState, outcome: CheckoutOutcome) -> Transition<Self> {
        let CheckoutOutcome::IntentCreated { attempt, result } = outcome;
        let order = match state {
            CheckoutState::Creating {
                order,
                attempt: current,
            } if *current == attempt => order.clone(),
            _ => {
                warn!(attempt, "stale payment intent discarded");
                return Transition::unchanged();
            }
        };

        match result {
            Ok(config) => {
                let sheet_config = config.sheet_config();
                info!(attempt, "payment intent created; presenting sheet");
                Transition::to(CheckoutState::Presenting {
                    order,
                    client_secret: config.client_secret.clone(),
                    config: sheet_config.clone(),
                })
                .with_effect(CheckoutEffect::Present {
                    client_secret: config.client_secret,
                    config: sheet_config,
                })
            }
            Err(failure) => {
                warn!(attempt, failure = ?failure, "checkout failed before presentation");
                let message = failure.message();
                Transition::to(CheckoutState::Failed { order, failure })
                    .with_effect(CheckoutEffect::ShowMessage(message))
            }
        }
    }

    fn on_work_panic(&self, state: &CheckoutState, reason: &str) -> Transition<Self> {
        let CheckoutState::Creating { order, .. } = state else {
            return Transition::unchanged();
        };
        let failure = CheckoutFailure::Create(ClientError::Network(format!(
            "request aborted: {reason}"
        )));
        let message = failure.message();
        Transition::to(CheckoutState::Failed {
            order: order.clone(),
            failure,
        })
        .with_effect(CheckoutEffect::ShowMessage(message))
    }
}

/// Checkout controller bound to the process-wide payment bus for its whole
/// lifetime. Dropping it tears it down.
pub struct PaymentCheckoutController {
    store: Arc<Store<CheckoutReducer>>,
    bus_listener: JoinHandle<()>,
}

impl PaymentCheckoutController {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        sheet: Arc<dyn PaymentSheet>,
        bus: &PaymentBus,
        merchant_display_name: impl Into<String>,
    ) -> Self {
        let store = Arc::new(Store::new(
            "payment_checkout",
            CheckoutState::Idle,
            CheckoutReducer::new(repository, sheet, merchant_display_name),
        ));

        // Subscribe before returning so no result published afterwards is missed.
        let mut results = bus.subscribe();
        let target = Arc::downgrade(&store);
        let bus_listener = tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                let Some(store) = target.upgrade() else {
                    break;
                };
                if store
                    .dispatch(CheckoutIntent::PaymentResult(result))
                    .is_err()
                {
                    break;
                }
            }
            debug!("payment bus listener stopped");
        });

        Self {
            store,
            bus_listener,
        }
    }

    pub fn dispatch(&self, intent: CheckoutIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn checkout(&self, amount: f64, currency: impl Into<String>) -> Result<(), StoreClosed> {
        self.dispatch(CheckoutIntent::Checkout {
            amount,
            currency: currency.into(),
        })
    }

    pub fn sheet_presented(&self) -> Result<(), StoreClosed> {
        self.dispatch(CheckoutIntent::SheetPresented)
    }

    pub fn abandon(&self) -> Result<(), StoreClosed> {
        self.dispatch(CheckoutIntent::Abandon)
    }

    pub fn state(&self) -> CheckoutState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<CheckoutState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<CheckoutEffect> {
        self.store.side_effects()
    }

    /// Unsubscribes from the bus and stops the container; results arriving
    /// afterwards are ignored.
    pub fn teardown(&self) {
        self.bus_listener.abort();
        self.store.shutdown();
    }
}

impl Drop for PaymentCheckoutController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "tests/checkout_tests.rs"]
mod tests;
