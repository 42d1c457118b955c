//! Billing: Stripe checkout and the signed webhook that drives the
//! subscription ledger and user tiers.

mod checkout;
mod events;
pub mod handlers;
mod ledger;
mod provider;
mod signature;

pub use checkout::CheckoutService;
pub use events::WebhookEvent;
pub use ledger::SubscriptionLedger;
pub use provider::{BillingProvider, CheckoutRequest, StripeClient};
pub use signature::{compute_signature, verify_signature};

use chrono::Utc;
use tracing::info;

use crate::error::{AppError, BillingError};

/// Verifies and applies one webhook delivery. Nothing is parsed or written
/// until the signature has been checked against the raw payload.
pub struct WebhookProcessor {
    secret: Option<String>,
    tolerance_secs: i64,
    ledger: SubscriptionLedger,
}

impl WebhookProcessor {
    pub fn new(secret: Option<String>, tolerance_secs: i64, ledger: SubscriptionLedger) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs,
            ledger,
        }
    }

    pub async fn process(&self, signature: Option<&str>, payload: &[u8]) -> Result<(), AppError> {
        let (Some(secret), Some(signature)) = (self.secret.as_deref(), signature) else {
            return Err(BillingError::MissingSignature.into());
        };
        verify_signature(secret, signature, payload, self.tolerance_secs, Utc::now().timestamp())?;

        let (event_id, event) = WebhookEvent::parse(payload)?;
        info!(%event_id, "webhook verified");
        self.ledger.apply(&event).await
    }
}
