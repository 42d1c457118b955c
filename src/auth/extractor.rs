use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use crate::db::models::User;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// The signed-in caller, resolved from an `Authorization: Bearer` header.
/// Any failure rejects the request with 401.
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let token = token.ok_or(AuthError::MissingToken)?;
            let state = state
                .ok_or_else(|| AppError::InternalError("application state not configured".into()))?;
            let user = state.auth_service.validate_token(&token).await?;
            Ok(AuthenticatedUser { user, token })
        })
    }
}
