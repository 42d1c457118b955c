//! Storage seams. `DbOperations` implements these against Postgres and
//! `MemoryStore` in process; services only see the traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::content::PostUpdate;
use crate::db::models::{
    Post, SignInToken, Subscription, Tier, UsagePeriod, UsageRecord, User, UserSession,
};
use crate::error::AppError;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<User, AppError>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Returns false when no such user exists.
    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &UserSession) -> Result<UserSession, AppError>;
    async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>, AppError>;
    async fn update_session_activity(&self, token: &str) -> Result<(), AppError>;
    async fn delete_session(&self, token: &str) -> Result<(), AppError>;
    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError>;
    async fn store_sign_in_token(&self, token: &SignInToken) -> Result<(), AppError>;
    /// Removes and returns the matching token, so each token is usable once.
    async fn take_sign_in_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<SignInToken>, AppError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Returns the record for the key, creating it with count 0 in the same
    /// atomic statement if absent.
    async fn get_or_create(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError>;
    /// Upserts the record and adds exactly one to its count atomically.
    async fn increment(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError>;
    async fn find(&self, user_id: Uuid, period: UsagePeriod) -> Result<Option<UsageRecord>, AppError>;
    /// Deletes records for periods strictly before `period`.
    async fn delete_before(&self, period: UsagePeriod) -> Result<u64, AppError>;
}

/// Every lookup is scoped by owner: a post belonging to someone else is
/// reported exactly like a missing one.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert_post(&self, post: &Post) -> Result<Post, AppError>;
    async fn find_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Post>, AppError>;
    async fn list_owned(&self, owner: Uuid) -> Result<Vec<Post>, AppError>;
    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &PostUpdate,
    ) -> Result<Option<Post>, AppError>;
    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError>;
    /// Inserts a pending row, or on an existing row for the user replaces the
    /// customer and price while keeping its status.
    async fn upsert_pending(&self, subscription: &Subscription) -> Result<Subscription, AppError>;
    /// Checkout completed: records the subscription id and marks the row
    /// active. Returns the number of rows touched.
    async fn activate_by_customer(
        &self,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<u64, AppError>;
    async fn update_by_subscription(
        &self,
        subscription_id: &str,
        status: &str,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError>;
    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>, AppError>;
}

/// The full set of stores the application is wired with.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
}

impl Repositories {
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: UserRepository
            + SessionRepository
            + UsageRepository
            + PostRepository
            + SubscriptionRepository
            + 'static,
    {
        Self {
            users: backend.clone(),
            sessions: backend.clone(),
            usage: backend.clone(),
            posts: backend.clone(),
            subscriptions: backend,
        }
    }
}
