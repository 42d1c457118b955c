use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::db::models::Tier;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub count: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub stripe_customer_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub email: String,
    pub tier: Tier,
    pub usage: UsageSummary,
    pub subscription: Option<SubscriptionSummary>,
}

pub async fn account(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = auth.user;
    let count = state.usage.current_count(user.id).await?;
    let limit = state.usage.free_limit();
    let subscription = state.subscriptions.find_by_user(user.id).await?;

    let summary = AccountSummary {
        usage: UsageSummary {
            count,
            limit,
            remaining: (!user.is_pro()).then(|| limit.saturating_sub(count)),
        },
        subscription: subscription.map(|s| SubscriptionSummary {
            status: s.status,
            current_period_end: s.current_period_end,
            stripe_customer_id: s.stripe_customer_id,
        }),
        email: user.email,
        tier: user.tier,
    };

    Ok(HttpResponse::Ok().json(summary))
}
