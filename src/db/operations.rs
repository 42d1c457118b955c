use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::content::PostUpdate;
use crate::db::models::{
    Post, PostLength, SeoMetadata, SignInToken, Subscription, Tier, UsagePeriod, UsageRecord,
    User, UserSession,
};
use crate::db::store::{
    PostRepository, SessionRepository, SubscriptionRepository, UsageRepository, UserRepository,
};
use crate::error::{AppError, DatabaseError};

const USER_COLUMNS: &str = "id, email, display_name, tier, created_at, updated_at";
const POST_COLUMNS: &str = "id, user_id, title, introduction, body, conclusion, keywords, length, \
     tone, audience, seo, created_at, updated_at";
const USAGE_COLUMNS: &str = "id, user_id, month, year, count, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, stripe_customer_id, stripe_subscription_id, \
     status, current_period_end, price_id, created_at, updated_at";

pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }
}

#[derive(Debug, Clone)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}

fn decode_err(column: &str, detail: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: detail.to_string().into(),
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let tier: String = row.try_get("tier")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        tier: tier.parse::<Tier>().map_err(|e| decode_err("tier", e))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<UserSession, sqlx::Error> {
    Ok(UserSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        last_activity: row.try_get("last_activity")?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post, sqlx::Error> {
    let length: String = row.try_get("length")?;
    let seo: Option<Json<SeoMetadata>> = row.try_get("seo")?;
    Ok(Post {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        introduction: row.try_get("introduction")?,
        body: row.try_get("body")?,
        conclusion: row.try_get("conclusion")?,
        keywords: row.try_get("keywords")?,
        length: PostLength::from_db_str(&length)
            .ok_or_else(|| decode_err("length", format!("unknown length '{length}'")))?,
        tone: row.try_get("tone")?,
        audience: row.try_get("audience")?,
        seo: seo.map(|Json(seo)| seo),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn usage_from_row(row: &PgRow) -> Result<UsageRecord, sqlx::Error> {
    let month: i32 = row.try_get("month")?;
    let count: i32 = row.try_get("count")?;
    Ok(UsageRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        month: month as u32,
        year: row.try_get("year")?,
        count: count.max(0) as u32,
        created_at: row.try_get("created_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, sqlx::Error> {
    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        status: row.try_get("status")?,
        current_period_end: row.try_get("current_period_end")?,
        price_id: row.try_get("price_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserRepository for DbOperations {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (id, email, display_name, tier, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.tier.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(user_from_row(&row)?)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET tier = $1, updated_at = $2 WHERE id = $3")
            .bind(tier.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepository for DbOperations {
    async fn create_session(&self, session: &UserSession) -> Result<UserSession, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO user_sessions (id, user_id, token, expires_at, created_at, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.last_activity)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(session_from_row(&row)?)
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>, AppError> {
        let row = sqlx::query("SELECT * FROM user_sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn update_session_activity(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE user_sessions SET last_activity = $1 WHERE token = $2")
            .bind(Utc::now())
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&mut *transaction)
            .await;

        match result {
            Ok(result) => {
                sqlx::query("DELETE FROM sign_in_tokens WHERE expires_at < $1")
                    .bind(Utc::now())
                    .execute(&mut *transaction)
                    .await?;
                transaction.commit().await?;
                Ok(result.rows_affected())
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn store_sign_in_token(&self, token: &SignInToken) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sign_in_tokens (email, token_hash, expires_at) VALUES ($1, $2, $3)")
            .bind(&token.email)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn take_sign_in_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<SignInToken>, AppError> {
        let row = sqlx::query(
            "DELETE FROM sign_in_tokens WHERE email = $1 AND token_hash = $2 \
             RETURNING email, token_hash, expires_at",
        )
        .bind(email)
        .bind(token_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let token = row
            .map(|row| -> Result<SignInToken, sqlx::Error> {
                Ok(SignInToken {
                    email: row.try_get("email")?,
                    token_hash: row.try_get("token_hash")?,
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .transpose()?;
        Ok(token)
    }
}

#[async_trait]
impl UsageRepository for DbOperations {
    async fn get_or_create(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(&format!(
            "INSERT INTO usage_records (id, user_id, month, year, count, created_at) \
             VALUES ($1, $2, $3, $4, 0, $5) \
             ON CONFLICT (user_id, month, year) DO UPDATE SET count = usage_records.count \
             RETURNING {USAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(period.month as i32)
        .bind(period.year)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(usage_from_row(&row)?)
    }

    async fn increment(&self, user_id: Uuid, period: UsagePeriod) -> Result<UsageRecord, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO usage_records (id, user_id, month, year, count, created_at) \
             VALUES ($1, $2, $3, $4, 1, $5) \
             ON CONFLICT (user_id, month, year) DO UPDATE SET count = usage_records.count + 1 \
             RETURNING {USAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(period.month as i32)
        .bind(period.year)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(usage_from_row(&row)?)
    }

    async fn find(&self, user_id: Uuid, period: UsagePeriod) -> Result<Option<UsageRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records WHERE user_id = $1 AND month = $2 AND year = $3"
        ))
        .bind(user_id)
        .bind(period.month as i32)
        .bind(period.year)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(usage_from_row).transpose()?)
    }

    async fn delete_before(&self, period: UsagePeriod) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM usage_records WHERE (year::bigint * 12 + (month - 1)) < $1")
            .bind(period.ordinal())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PostRepository for DbOperations {
    async fn insert_post(&self, post: &Post) -> Result<Post, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO posts ({POST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(post.id)
        .bind(post.user_id)
        .bind(&post.title)
        .bind(&post.introduction)
        .bind(&post.body)
        .bind(&post.conclusion)
        .bind(&post.keywords)
        .bind(post.length.as_db_str())
        .bind(&post.tone)
        .bind(&post.audience)
        .bind(post.seo.as_ref().map(Json))
        .bind(post.created_at)
        .bind(post.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(post_from_row(&row)?)
    }

    async fn find_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Post>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn list_owned(&self, owner: Uuid) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(owner)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(post_from_row).collect::<Result<_, _>>()?)
    }

    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &PostUpdate,
    ) -> Result<Option<Post>, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *transaction)
        .await?;

        let Some(row) = row else {
            transaction.rollback().await?;
            return Ok(None);
        };

        let mut post = post_from_row(&row)?;
        update.apply_to(&mut post);

        sqlx::query(
            r#"
            UPDATE posts
            SET title = $1, introduction = $2, body = $3, conclusion = $4, keywords = $5,
                length = $6, tone = $7, audience = $8, seo = $9, updated_at = $10
            WHERE id = $11 AND user_id = $12
            "#,
        )
        .bind(&post.title)
        .bind(&post.introduction)
        .bind(&post.body)
        .bind(&post.conclusion)
        .bind(&post.keywords)
        .bind(post.length.as_db_str())
        .bind(&post.tone)
        .bind(&post.audience)
        .bind(post.seo.as_ref().map(Json))
        .bind(post.updated_at)
        .bind(id)
        .bind(owner)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(Some(post))
    }

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SubscriptionRepository for DbOperations {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(subscription_from_row).transpose()?)
    }

    async fn upsert_pending(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO subscriptions ({SUBSCRIPTION_COLUMNS}) \
             VALUES ($1, $2, $3, NULL, $4, NULL, $5, $6, $6) \
             ON CONFLICT (user_id) DO UPDATE \
             SET stripe_customer_id = EXCLUDED.stripe_customer_id, \
                 price_id = EXCLUDED.price_id, updated_at = EXCLUDED.updated_at \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(&subscription.stripe_customer_id)
        .bind(&subscription.status)
        .bind(&subscription.price_id)
        .bind(subscription.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(subscription_from_row(&row)?)
    }

    async fn activate_by_customer(
        &self,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET stripe_subscription_id = $1, status = $2, updated_at = $3 \
             WHERE stripe_customer_id = $4",
        )
        .bind(subscription_id)
        .bind(Subscription::ACTIVE)
        .bind(Utc::now())
        .bind(customer_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn update_by_subscription(
        &self,
        subscription_id: &str,
        status: &str,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE subscriptions \
             SET status = $1, current_period_end = COALESCE($2, current_period_end), updated_at = $3 \
             WHERE stripe_subscription_id = $4",
        )
        .bind(status)
        .bind(current_period_end)
        .bind(Utc::now())
        .bind(subscription_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE stripe_subscription_id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(subscription_from_row).transpose()?)
    }
}
