use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::BillingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: Uuid,
    pub success_url: String,
    pub cancel_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Returns the new customer id.
    async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String, BillingError>;
    /// Returns the hosted checkout URL.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError>;
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Minimal Stripe REST client over form-encoded requests.
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.stripe_api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
        }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, BillingError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(text);
            return Err(BillingError::ProviderFailure(format!("{path} returned {status}: {message}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String, BillingError> {
        let customer: CustomerResponse = self
            .post_form(
                "customers",
                &[
                    ("email", email.to_string()),
                    ("metadata[userId]", user_id.to_string()),
                ],
            )
            .await?;
        debug!(customer_id = %customer.id, "stripe customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError> {
        let user_id = request.user_id.to_string();
        let session: CheckoutSessionResponse = self
            .post_form(
                "checkout/sessions",
                &[
                    ("customer", request.customer_id.clone()),
                    ("mode", "subscription".to_string()),
                    ("line_items[0][price]", request.price_id.clone()),
                    ("line_items[0][quantity]", "1".to_string()),
                    ("success_url", request.success_url.clone()),
                    ("cancel_url", request.cancel_url.clone()),
                    ("subscription_data[metadata][userId]", user_id.clone()),
                    ("metadata[userId]", user_id),
                ],
            )
            .await?;
        debug!(session_id = %session.id, "stripe checkout session created");
        session
            .url
            .ok_or_else(|| BillingError::ProviderFailure("checkout session has no url".into()))
    }
}
