use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub token: String,
}

pub async fn sign_in(
    req: web::Json<SignInRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let link = state.auth_service.request_sign_in(&req.email).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Check your email for a sign-in link",
        "expiresAt": link.expires_at,
    })))
}

pub async fn verify(
    req: web::Json<VerifyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let grant = state.auth_service.verify_sign_in(&req.email, &req.token).await?;
    info!(user_id = %grant.user.id, "sign-in verified");
    Ok(HttpResponse::Ok().json(grant))
}

pub async fn logout(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.logout(&auth.token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}
