//! Boundary with the external payment sheet: its configuration, the outcome
//! it reports, and the adapter that turns its callback into a bus event.

use std::sync::Arc;

use anyhow::Result;
use shared::protocol::PaymentIntentResponse;
use tracing::{debug, info};

use crate::event_bus::EventBus;

pub const DEFAULT_MERCHANT_NAME: &str = "Quiz Upgrade";

/// Terminal result reported by the payment sheet, once per presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed,
    Canceled,
    Failed(String),
}

/// A sheet outcome tagged with the client secret of the presentation it
/// ends, so a late result from an abandoned sheet cannot settle a newer
/// checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    pub client_secret: String,
    pub outcome: PaymentOutcome,
}

pub type PaymentBus = EventBus<PaymentResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub publishable_key: String,
    pub client_secret: String,
    pub customer_id: Option<String>,
    pub ephemeral_key_secret: Option<String>,
    pub merchant_display_name: String,
    pub allows_delayed_payment_methods: bool,
}

impl PaymentConfig {
    pub fn from_intent(response: PaymentIntentResponse, merchant_display_name: &str) -> Self {
        Self {
            publishable_key: response.publishable_key,
            client_secret: response.payment_intent,
            customer_id: response.customer,
            ephemeral_key_secret: response.ephemeral_key,
            merchant_display_name: merchant_display_name.to_string(),
            allows_delayed_payment_methods: true,
        }
    }

    pub fn sheet_config(&self) -> SheetConfig {
        let customer = match (&self.customer_id, &self.ephemeral_key_secret) {
            (Some(id), Some(ephemeral_key_secret)) => Some(CustomerConfig {
                id: id.clone(),
                ephemeral_key_secret: ephemeral_key_secret.clone(),
            }),
            _ => None,
        };
        SheetConfig {
            merchant_display_name: self.merchant_display_name.clone(),
            customer,
            allows_delayed_payment_methods: self.allows_delayed_payment_methods,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerConfig {
    pub id: String,
    pub ephemeral_key_secret: String,
}

/// What the sheet needs besides the client secret to present itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    pub merchant_display_name: String,
    pub customer: Option<CustomerConfig>,
    pub allows_delayed_payment_methods: bool,
}

/// External payment capability.
///
/// `configure` is process-wide and must complete before `present`. The
/// result of a presentation is reported later through a
/// [`PaymentResultCallback`], never as a return value.
pub trait PaymentSheet: Send + Sync {
    fn configure(&self, publishable_key: &str) -> Result<()>;
    fn present(&self, client_secret: &str, config: &SheetConfig) -> Result<()>;
}

pub trait PaymentResultCallback: Send + Sync {
    /// `client_secret` is the one the finished sheet was presented with.
    fn on_payment_result(&self, client_secret: &str, outcome: PaymentOutcome);
}

/// Publishes every sheet result onto the payment bus. Safe to call from any
/// thread.
pub struct PaymentResultAdapter {
    bus: Arc<PaymentBus>,
}

impl PaymentResultAdapter {
    pub fn new(bus: Arc<PaymentBus>) -> Self {
        Self { bus }
    }
}

impl PaymentResultCallback for PaymentResultAdapter {
    fn on_payment_result(&self, client_secret: &str, outcome: PaymentOutcome) {
        let delivered = self.bus.publish(PaymentResult {
            client_secret: client_secret.to_string(),
            outcome: outcome.clone(),
        });
        if delivered == 0 {
            debug!(?outcome, "payment result published with no listener");
        } else {
            info!(?outcome, delivered, "payment result published");
        }
    }
}
