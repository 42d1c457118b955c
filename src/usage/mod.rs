//! Usage Ledger: per-user, per-calendar-month generation counters and the
//! free-tier quota check.

pub mod handlers;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{UsagePeriod, UsageRecord};
use crate::db::UsageRepository;
use crate::error::AppError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct UsageLedger {
    store: Arc<dyn UsageRepository>,
    clock: Arc<dyn Clock>,
    free_limit: u32,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageRepository>, free_limit: u32) -> Self {
        Self::with_clock(store, free_limit, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn UsageRepository>, free_limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, free_limit }
    }

    pub fn free_limit(&self) -> u32 {
        self.free_limit
    }

    pub fn current_period(&self) -> UsagePeriod {
        UsagePeriod::containing(self.clock.now())
    }

    pub async fn get_or_create_monthly_usage(
        &self,
        user_id: Uuid,
        period: UsagePeriod,
    ) -> Result<UsageRecord, AppError> {
        self.store.get_or_create(user_id, period).await
    }

    /// Adds one generation to the caller's current-month record.
    pub async fn increment(&self, user_id: Uuid) -> Result<UsageRecord, AppError> {
        let record = self.store.increment(user_id, self.current_period()).await?;
        info!(user_id = %user_id, count = record.count, "usage incremented");
        Ok(record)
    }

    pub async fn has_remaining_free_credits(&self, user_id: Uuid, limit: u32) -> Result<bool, AppError> {
        let usage = self.get_or_create_monthly_usage(user_id, self.current_period()).await?;
        Ok(usage.count < limit)
    }

    /// Count for the current month without creating a record.
    pub async fn current_count(&self, user_id: Uuid) -> Result<u32, AppError> {
        Ok(self
            .store
            .find(user_id, self.current_period())
            .await?
            .map(|r| r.count)
            .unwrap_or(0))
    }

    /// Best-effort cleanup of records older than the previous calendar month.
    pub async fn sweep_stale(&self) -> Result<u64, AppError> {
        let cutoff = self.current_period().previous();
        let removed = self.store.delete_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "swept stale usage records");
        }
        Ok(removed)
    }
}
