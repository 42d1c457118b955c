use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Model gateway error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("Billing error: {0}")]
    BillingError(#[from] BillingError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Free plan limit of {limit} generations reached. Upgrade to Pro for unlimited generations.")]
    QuotaExceeded { limit: u32 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl AppError {
    /// Message safe to hand back to the client. Upstream and storage
    /// failures are logged in full but reported generically.
    pub fn public_message(&self) -> String {
        match self {
            AppError::AuthError(e) => e.to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::QuotaExceeded { .. } => self.to_string(),
            AppError::DatabaseError(DatabaseError::NotFound) => "Not found".to_string(),
            AppError::BillingError(
                e @ (BillingError::MissingSignature
                | BillingError::InvalidSignature
                | BillingError::MalformedEvent(_)),
            ) => e.to_string(),
            AppError::GatewayError(_) => "Content generation failed".to_string(),
            AppError::BillingError(_) => "Billing provider request failed".to_string(),
            AppError::DatabaseError(_) => "Unable to save changes".to_string(),
            AppError::ConfigError(_) | AppError::InternalError(_) => "Internal server error".to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::ConnectionError(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::AuthError(err.into())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": self.public_message()
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::BillingError(BillingError::MissingSignature)
            | AppError::BillingError(BillingError::InvalidSignature)
            | AppError::BillingError(BillingError::MalformedEvent(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid or expired sign-in link")]
    InvalidSignInLink,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        }
    }
}

/// Failures talking to the text-generation service.
///
/// `Transport` and `EmptyContent` are fatal for the call. `MalformedContent`
/// means the service answered but the answer did not have the expected shape.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("request to model service failed: {0}")]
    Transport(String),

    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model service returned no content")]
    EmptyContent,

    #[error("model service returned malformed content: {0}")]
    MalformedContent(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        !matches!(self, GatewayError::MalformedContent(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Billing provider request failed: {0}")]
    ProviderFailure(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedEvent(String),
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::ProviderFailure(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => DatabaseError::Duplicate,
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let db_err = sqlx::Error::RowNotFound;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::NotFound)));
    }

    #[test]
    fn test_error_status_codes() {
        let err = AppError::AuthError(AuthError::MissingToken);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = AppError::ValidationError("invalid input".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::QuotaExceeded { limit: 5 };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::BillingError(BillingError::InvalidSignature);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::GatewayError(GatewayError::EmptyContent);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_quota_message_points_to_upgrade() {
        let err = AppError::QuotaExceeded { limit: 5 };
        assert!(err.public_message().contains("Upgrade to Pro"));
    }

    #[test]
    fn test_provider_details_stay_internal() {
        let err = AppError::GatewayError(GatewayError::Status {
            status: 502,
            body: "upstream secret detail".to_string(),
        });
        assert!(err.to_string().contains("upstream secret detail"));
        assert!(!err.public_message().contains("upstream"));

        let err = AppError::BillingError(BillingError::ProviderFailure("sk_live leaked".into()));
        assert!(!err.public_message().contains("sk_live"));
    }

    #[test]
    fn test_transport_and_malformed_are_distinct() {
        assert!(GatewayError::EmptyContent.is_transport());
        assert!(GatewayError::Transport("timeout".into()).is_transport());
        assert!(!GatewayError::MalformedContent("no json".into()).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "Validation error: test error");

        let err = AppError::AuthError(AuthError::InvalidToken);
        assert_eq!(err.to_string(), "Authentication error: Invalid token");

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.to_string(), "Database error: Record not found");
    }
}
