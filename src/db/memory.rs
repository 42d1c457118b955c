//! In-process storage with the same contract as the Postgres backend.
//! Each table sits behind its own lock; usage increments happen under the
//! write lock so they are atomic per key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::content::PostUpdate;
use crate::db::models::{
    Post, SignInToken, Subscription, Tier, UsagePeriod, UsageRecord, User, UserSession,
};
use crate::db::store::{
    PostRepository, SessionRepository, SubscriptionRepository, UsageRepository, UserRepository,
};
use crate::error::{AppError, DatabaseError};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, UserSession>>,
    sign_in_tokens: RwLock<Vec<SignInToken>>,
    usage: RwLock<HashMap<(Uuid, UsagePeriod), UsageRecord>>,
    posts: RwLock<HashMap<Uuid, Post>>,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.values().find(|u| u.email == email).cloned())
    }

    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                user.tier = tier;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, session: &UserSession) -> Result<UserSession, AppError> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>, AppError> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn update_session_activity(&self, token: &str) -> Result<(), AppError> {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.last_activity = Utc::now();
        }
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }

    async fn store_sign_in_token(&self, token: &SignInToken) -> Result<(), AppError> {
        self.sign_in_tokens.write().await.push(token.clone());
        Ok(())
    }

    async fn take_sign_in_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<SignInToken>, AppError> {
        let mut tokens = self.sign_in_tokens.write().await;
        let position = tokens
            .iter()
            .position(|t| t.email == email && t.token_hash == token_hash);
        Ok(position.map(|i| tokens.swap_remove(i)))
    }
}

#[async_trait]
impl UsageRepository for MemoryStore {
    async fn get_or_create(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError> {
        let mut usage = self.usage.write().await;
        Ok(usage
            .entry((user_id, period))
            .or_insert_with(|| UsageRecord::new(user_id, period))
            .clone())
    }

    async fn increment(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError> {
        let mut usage = self.usage.write().await;
        let record = usage
            .entry((user_id, period))
            .or_insert_with(|| UsageRecord::new(user_id, period));
        record.count += 1;
        Ok(record.clone())
    }

    async fn find(&self, user_id: Uuid, period: UsagePeriod) -> Result<Option<UsageRecord>, AppError> {
        Ok(self.usage.read().await.get(&(user_id, period)).cloned())
    }

    async fn delete_before(&self, period: UsagePeriod) -> Result<u64, AppError> {
        let mut usage = self.usage.write().await;
        let before = usage.len();
        usage.retain(|(_, p), _| *p >= period);
        Ok((before - usage.len()) as u64)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn insert_post(&self, post: &Post) -> Result<Post, AppError> {
        self.posts.write().await.insert(post.id, post.clone());
        Ok(post.clone())
    }

    async fn find_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Post>, AppError> {
        Ok(self
            .posts
            .read()
            .await
            .get(&id)
            .filter(|p| p.user_id == owner)
            .cloned())
    }

    async fn list_owned(&self, owner: Uuid) -> Result<Vec<Post>, AppError> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect())
    }

    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &PostUpdate,
    ) -> Result<Option<Post>, AppError> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(&id).filter(|p| p.user_id == owner) {
            Some(post) => {
                update.apply_to(post);
                Ok(Some(post.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let mut posts = self.posts.write().await;
        if posts.get(&id).is_some_and(|p| p.user_id == owner) {
            posts.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self.subscriptions.read().await.get(&user_id).cloned())
    }

    async fn upsert_pending(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        let mut subscriptions = self.subscriptions.write().await;
        let row = subscriptions
            .entry(subscription.user_id)
            .and_modify(|existing| {
                existing.stripe_customer_id = subscription.stripe_customer_id.clone();
                existing.price_id = subscription.price_id.clone();
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| subscription.clone());
        Ok(row.clone())
    }

    async fn activate_by_customer(
        &self,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<u64, AppError> {
        let mut touched = 0;
        for row in self.subscriptions.write().await.values_mut() {
            if row.stripe_customer_id == customer_id {
                row.stripe_subscription_id = Some(subscription_id.to_string());
                row.status = Subscription::ACTIVE.to_string();
                row.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn update_by_subscription(
        &self,
        subscription_id: &str,
        status: &str,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError> {
        let mut touched = 0;
        for row in self.subscriptions.write().await.values_mut() {
            if row.stripe_subscription_id.as_deref() == Some(subscription_id) {
                row.status = status.to_string();
                if current_period_end.is_some() {
                    row.current_period_end = current_period_end;
                }
                row.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>, AppError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_increments_share_one_record() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let period = UsagePeriod { year: 2024, month: 5 };

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment(user, period).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = store.find(user, period).await.unwrap().unwrap();
        assert_eq!(record.count, 20);
        assert_eq!(store.usage.read().await.len(), 1);
    }

    #[tokio::test]
    async fn sign_in_token_is_single_use() {
        let store = MemoryStore::new();
        let token = SignInToken {
            email: "a@example.com".into(),
            token_hash: "abc".into(),
            expires_at: Utc::now(),
        };
        store.store_sign_in_token(&token).await.unwrap();
        assert!(store.take_sign_in_token("a@example.com", "abc").await.unwrap().is_some());
        assert!(store.take_sign_in_token("a@example.com", "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_user(&User::new("a@example.com".into(), None)).await.unwrap();
        let second = store.create_user(&User::new("a@example.com".into(), None)).await;
        assert!(matches!(second, Err(AppError::DatabaseError(DatabaseError::Duplicate))));
    }
}
