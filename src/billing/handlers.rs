use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub price_id: Option<String>,
}

pub async fn checkout(
    auth: AuthenticatedUser,
    req: web::Json<CheckoutBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let price_id = req
        .price_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::ValidationError("Missing price ID".into()))?;

    let checkout_url = state.checkout.start_checkout(&auth.user, price_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "checkoutUrl": checkout_url })))
}

/// Receives the body as raw bytes so the signature is checked against
/// exactly what Stripe signed.
pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    state.webhooks.process(signature, &body).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })))
}
