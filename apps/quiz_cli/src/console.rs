//! Terminal stand-in for the hosted payment sheet.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};
use client_core::payment::{
    PaymentOutcome, PaymentResultAdapter, PaymentResultCallback, PaymentSheet, SheetConfig,
};
use parking_lot::Mutex;
use tracing::debug;

/// Asks for confirmation on stdin and reports the answer through the
/// payment result adapter.
pub struct ConsolePaymentSheet {
    adapter: PaymentResultAdapter,
    publishable_key: Mutex<Option<String>>,
}

impl ConsolePaymentSheet {
    pub fn new(adapter: PaymentResultAdapter) -> Self {
        Self {
            adapter,
            publishable_key: Mutex::new(None),
        }
    }
}

fn outcome_for(answer: &str) -> PaymentOutcome {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "pay" => PaymentOutcome::Completed,
        "f" | "fail" => PaymentOutcome::Failed("card declined".to_string()),
        _ => PaymentOutcome::Canceled,
    }
}

impl PaymentSheet for ConsolePaymentSheet {
    fn configure(&self, publishable_key: &str) -> Result<()> {
        if publishable_key.trim().is_empty() {
            return Err(anyhow!("publishable key is empty"));
        }
        *self.publishable_key.lock() = Some(publishable_key.to_string());
        Ok(())
    }

    fn present(&self, client_secret: &str, config: &SheetConfig) -> Result<()> {
        let key = self
            .publishable_key
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("payment sheet presented before configure"))?;
        debug!(publishable_key = %key, "presenting console payment sheet");

        let mut stdout = io::stdout().lock();
        writeln!(stdout, "--- {} ---", config.merchant_display_name)?;
        writeln!(stdout, "payment: {client_secret}")?;
        if let Some(customer) = &config.customer {
            writeln!(stdout, "customer: {}", customer.id)?;
        }
        write!(stdout, "Confirm payment? [y]es / [n]o / [f]ail: ")?;
        stdout.flush()?;
        drop(stdout);

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("failed to read confirmation")?;
        self.adapter.on_payment_result(client_secret, outcome_for(&answer));
        Ok(())
    }
}
