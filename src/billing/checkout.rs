use std::sync::Arc;
use tracing::info;

use crate::billing::provider::{BillingProvider, CheckoutRequest};
use crate::config::BillingConfig;
use crate::db::models::{Subscription, User};
use crate::db::SubscriptionRepository;
use crate::error::AppError;

pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            provider,
            subscriptions,
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        }
    }

    /// Starts a subscription checkout for `price_id` and returns the hosted
    /// checkout URL. A billing customer is created on first use and reused
    /// afterwards.
    pub async fn start_checkout(&self, user: &User, price_id: &str) -> Result<String, AppError> {
        let customer_id = match self.subscriptions.find_by_user(user.id).await? {
            Some(existing) => existing.stripe_customer_id,
            None => {
                let customer_id = self.provider.create_customer(&user.email, user.id).await?;
                self.subscriptions
                    .upsert_pending(&Subscription::pending(
                        user.id,
                        customer_id.clone(),
                        price_id.to_string(),
                    ))
                    .await?;
                info!(user_id = %user.id, %customer_id, "billing customer created");
                customer_id
            }
        };

        let url = self
            .provider
            .create_checkout_session(&CheckoutRequest {
                customer_id,
                price_id: price_id.to_string(),
                user_id: user.id,
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
            })
            .await?;

        info!(user_id = %user.id, %price_id, "checkout session created");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::provider::MockBillingProvider;
    use crate::config::Settings;
    use crate::db::MemoryStore;
    use crate::error::BillingError;

    fn service(provider: MockBillingProvider, store: Arc<MemoryStore>) -> CheckoutService {
        let settings = Settings::new_for_test().unwrap();
        CheckoutService::new(Arc::new(provider), store, &settings.billing)
    }

    #[tokio::test]
    async fn first_checkout_creates_customer_and_pending_row() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("buyer@example.com".into(), None);

        let mut provider = MockBillingProvider::new();
        provider
            .expect_create_customer()
            .times(1)
            .returning(|_, _| Ok("cus_new".to_string()));
        let user_id = user.id;
        provider
            .expect_create_checkout_session()
            .withf(move |req| req.customer_id == "cus_new" && req.price_id == "price_pro" && req.user_id == user_id)
            .times(1)
            .returning(|_| Ok("https://checkout.stripe.test/c/1".to_string()));

        let url = service(provider, store.clone()).start_checkout(&user, "price_pro").await.unwrap();
        assert_eq!(url, "https://checkout.stripe.test/c/1");

        let sub = store.find_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(sub.status, Subscription::PENDING);
        assert_eq!(sub.stripe_customer_id, "cus_new");
    }

    #[tokio::test]
    async fn existing_customer_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("buyer@example.com".into(), None);
        store
            .upsert_pending(&Subscription::pending(user.id, "cus_old".into(), "price_pro".into()))
            .await
            .unwrap();

        let mut provider = MockBillingProvider::new();
        provider.expect_create_customer().never();
        provider
            .expect_create_checkout_session()
            .withf(|req| req.customer_id == "cus_old")
            .returning(|_| Ok("https://checkout.stripe.test/c/2".to_string()));

        assert!(service(provider, store).start_checkout(&user, "price_pro").await.is_ok());
    }

    #[tokio::test]
    async fn provider_failure_surfaces() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("buyer@example.com".into(), None);

        let mut provider = MockBillingProvider::new();
        provider
            .expect_create_customer()
            .returning(|_, _| Err(BillingError::ProviderFailure("card_declined".into())));

        let err = service(provider, store.clone()).start_checkout(&user, "price_pro").await.unwrap_err();
        assert!(matches!(err, AppError::BillingError(BillingError::ProviderFailure(_))));
        assert!(store.find_by_user(user.id).await.unwrap().is_none());
    }
}
