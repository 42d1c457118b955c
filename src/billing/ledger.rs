use std::sync::Arc;
use tracing::{info, warn};

use crate::billing::events::WebhookEvent;
use crate::db::models::Tier;
use crate::db::{SubscriptionRepository, UserRepository};
use crate::error::AppError;

/// Applies verified billing events to stored subscriptions and user tiers.
pub struct SubscriptionLedger {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserRepository>,
}

impl SubscriptionLedger {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { subscriptions, users }
    }

    pub async fn apply(&self, event: &WebhookEvent) -> Result<(), AppError> {
        match event {
            WebhookEvent::CheckoutCompleted {
                customer_id: Some(customer_id),
                subscription_id: Some(subscription_id),
                user_id,
            } => {
                let rows = self
                    .subscriptions
                    .activate_by_customer(customer_id, subscription_id)
                    .await?;
                info!(%customer_id, %subscription_id, rows, "checkout completed");

                match user_id {
                    Some(user_id) => {
                        if !self.users.set_tier(*user_id, Tier::Pro).await? {
                            warn!(%user_id, "checkout completed for unknown user");
                        }
                    }
                    None => warn!(%customer_id, "checkout completed without userId metadata"),
                }
            }
            WebhookEvent::CheckoutCompleted { .. } => {
                info!("checkout completed without subscription or customer; nothing to do");
            }
            WebhookEvent::SubscriptionChanged { subscription_id, status, current_period_end } => {
                let rows = self
                    .subscriptions
                    .update_by_subscription(subscription_id, status, *current_period_end)
                    .await?;
                info!(%subscription_id, %status, rows, "subscription status mirrored");
            }
            WebhookEvent::SubscriptionDeleted { subscription_id, status } => {
                self.subscriptions
                    .update_by_subscription(subscription_id, status, None)
                    .await?;
                match self.subscriptions.find_by_subscription(subscription_id).await? {
                    Some(subscription) => {
                        self.users.set_tier(subscription.user_id, Tier::Free).await?;
                        info!(%subscription_id, user_id = %subscription.user_id, "subscription deleted; user downgraded");
                    }
                    None => warn!(%subscription_id, "deleted subscription is not linked to any user"),
                }
            }
            WebhookEvent::Ignored { event_type } => {
                info!(%event_type, "ignoring webhook event");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Subscription, User};
    use crate::db::MemoryStore;
    use uuid::Uuid;

    async fn setup() -> (Arc<MemoryStore>, SubscriptionLedger, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(&User::new("payer@example.com".into(), None))
            .await
            .unwrap();
        store
            .upsert_pending(&Subscription::pending(user.id, "cus_1".into(), "price_pro".into()))
            .await
            .unwrap();
        let ledger = SubscriptionLedger::new(store.clone(), store.clone());
        (store, ledger, user)
    }

    fn completed(user: &User) -> WebhookEvent {
        WebhookEvent::CheckoutCompleted {
            customer_id: Some("cus_1".into()),
            subscription_id: Some("sub_1".into()),
            user_id: Some(user.id),
        }
    }

    #[tokio::test]
    async fn checkout_activates_and_upgrades() {
        let (store, ledger, user) = setup().await;
        ledger.apply(&completed(&user)).await.unwrap();

        let sub = store.find_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(sub.status, Subscription::ACTIVE);
        assert_eq!(sub.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(store.get_user_by_id(user.id).await.unwrap().unwrap().tier, Tier::Pro);
    }

    #[test_log::test(tokio::test)]
    async fn checkout_without_subscription_changes_nothing() {
        let (store, ledger, user) = setup().await;
        ledger
            .apply(&WebhookEvent::CheckoutCompleted {
                customer_id: Some("cus_1".into()),
                subscription_id: None,
                user_id: Some(user.id),
            })
            .await
            .unwrap();

        assert_eq!(store.find_by_user(user.id).await.unwrap().unwrap().status, Subscription::PENDING);
        assert_eq!(store.get_user_by_id(user.id).await.unwrap().unwrap().tier, Tier::Free);
    }

    #[tokio::test]
    async fn update_mirrors_status_and_period_end() {
        let (store, ledger, user) = setup().await;
        ledger.apply(&completed(&user)).await.unwrap();

        let period_end = chrono::Utc::now() + chrono::Duration::days(30);
        ledger
            .apply(&WebhookEvent::SubscriptionChanged {
                subscription_id: "sub_1".into(),
                status: "past_due".into(),
                current_period_end: Some(period_end),
            })
            .await
            .unwrap();

        let sub = store.find_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(sub.status, "past_due");
        assert_eq!(sub.current_period_end, Some(period_end));
    }

    #[tokio::test]
    async fn deletion_downgrades_linked_user() {
        let (store, ledger, user) = setup().await;
        ledger.apply(&completed(&user)).await.unwrap();
        ledger
            .apply(&WebhookEvent::SubscriptionDeleted {
                subscription_id: "sub_1".into(),
                status: "canceled".into(),
            })
            .await
            .unwrap();

        assert_eq!(store.find_by_user(user.id).await.unwrap().unwrap().status, "canceled");
        assert_eq!(store.get_user_by_id(user.id).await.unwrap().unwrap().tier, Tier::Free);
    }

    #[test_log::test(tokio::test)]
    async fn deletion_of_unknown_subscription_is_harmless() {
        let (_, ledger, _) = setup().await;
        let event = WebhookEvent::SubscriptionDeleted {
            subscription_id: format!("sub_{}", Uuid::new_v4()),
            status: "canceled".into(),
        };
        assert!(ledger.apply(&event).await.is_ok());
    }
}
