use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Settings;
use crate::db::models::{SignInToken, User, UserSession};
use crate::db::{SessionRepository, UserRepository};
use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
    pub jti: String,  // Session nonce
}

/// A freshly issued sign-in link. The raw token only exists here and in the
/// link; storage keeps its digest.
#[derive(Debug, Clone)]
pub struct SignInLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    jwt_secret: String,
    token_expiry_hours: i64,
    link_expiry_hours: i64,
    public_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        settings: &Settings,
    ) -> Self {
        Self {
            users,
            sessions,
            jwt_secret: settings.auth.jwt_secret.clone(),
            token_expiry_hours: settings.auth.token_expiry_hours,
            link_expiry_hours: settings.auth.sign_in_link_expiry_hours,
            public_url: settings.server.public_url.clone(),
        }
    }

    /// Issues a single-use sign-in link for `email`. There is no mail
    /// transport; the link is written to the log.
    pub async fn request_sign_in(&self, email: &str) -> Result<SignInLink, AppError> {
        let email = normalize_email(email)?;

        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);
        let expires_at = Utc::now() + Duration::hours(self.link_expiry_hours);

        self.sessions
            .store_sign_in_token(&SignInToken {
                email: email.clone(),
                token_hash: hash_token(&token),
                expires_at,
            })
            .await?;

        let mut url = Url::parse(&self.public_url)
            .and_then(|base| base.join("/auth/verify"))
            .map_err(|e| AppError::ConfigError(format!("invalid server.public_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("email", &email)
            .append_pair("token", &token);

        info!(%email, link = %url, "sign-in link issued");
        Ok(SignInLink { url: url.into(), expires_at })
    }

    /// Consumes a sign-in token and opens a session, creating the user on
    /// first sign-in.
    pub async fn verify_sign_in(&self, email: &str, token: &str) -> Result<SessionGrant, AppError> {
        let email = normalize_email(email)?;

        let stored = self
            .sessions
            .take_sign_in_token(&email, &hash_token(token))
            .await?
            .ok_or(AuthError::InvalidSignInLink)?;
        if stored.expires_at < Utc::now() {
            warn!(%email, "expired sign-in link used");
            return Err(AuthError::InvalidSignInLink.into());
        }

        let user = match self.users.get_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                let user = self.users.create_user(&User::new(email.clone(), None)).await?;
                info!(user_id = %user.id, "user created on first sign-in");
                user
            }
        };

        let (token, expires_at) = self.generate_token(user.id)?;
        self.sessions
            .create_session(&UserSession::new(user.id, token.clone(), self.token_expiry_hours))
            .await?;

        info!(user_id = %user.id, "session opened");
        Ok(SessionGrant { token, expires_at, user })
    }

    /// Resolves a bearer token to its user. The JWT must verify and its
    /// session row must still exist.
    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let claims = self.decode_token(token)?;

        let session = self
            .sessions
            .get_session_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if session.is_expired() {
            return Err(AuthError::TokenExpired.into());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.sessions.update_session_activity(token).await?;
        Ok(user)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.sessions.delete_session(token).await
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let removed = self.sessions.cleanup_expired_sessions().await?;
        if removed > 0 {
            info!(removed, "expired sessions removed");
        }
        Ok(removed)
    }

    fn generate_token(&self, user_id: Uuid) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.token_expiry_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok((token, expires_at))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(claims.claims)
    }
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::ValidationError("A valid email address is required".into())),
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
