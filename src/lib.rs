pub mod auth;
pub mod billing;
pub mod config;
pub mod content;
pub mod db;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod generation;
pub mod usage;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, AuthenticatedUser};
pub use db::{DbOperations, Post, User, UserSession};

use billing::{BillingProvider, CheckoutService, StripeClient, SubscriptionLedger, WebhookProcessor};
use config::StorageBackend;
use content::ContentStore;
use db::{MemoryStore, Repositories, SubscriptionRepository};
use gateway::{CompletionBackend, ModelGateway};
use generation::GenerationService;
use usage::UsageLedger;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.db {
        Some(db) => {
            let status = db.get_pool_status().await;
            serde_json::json!({
                "backend": "postgres",
                "connections": status.total_connections,
                "idle": status.idle_connections,
            })
        }
        None => serde_json::json!({ "backend": "memory" }),
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": database,
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: Option<Arc<DbOperations>>,
    pub auth_service: Arc<AuthService>,
    pub usage: Arc<UsageLedger>,
    pub content: Arc<ContentStore>,
    pub generation: Arc<GenerationService>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub checkout: Arc<CheckoutService>,
    pub webhooks: Arc<WebhookProcessor>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let (repositories, db) = match config.database.backend {
            StorageBackend::Postgres => {
                let db = Arc::new(
                    DbOperations::new_with_options(
                        &config.database.url,
                        config.database.max_connections,
                        Duration::from_secs(5),
                    )
                    .await?,
                );
                db.run_migrations().await?;
                info!("database migrations applied");
                (Repositories::from_backend(db.clone()), Some(db))
            }
            StorageBackend::Memory => {
                info!("using in-memory storage; data is lost on restart");
                (Repositories::from_backend(Arc::new(MemoryStore::new())), None)
            }
        };

        let gateway = ModelGateway::from_config(&config.model)?;
        let billing: Arc<dyn BillingProvider> = Arc::new(StripeClient::new(&config.billing));

        let mut state = Self::assemble(config, repositories, gateway, billing);
        state.db = db;
        Ok(state)
    }

    /// Wires the services over caller-supplied storage and external
    /// collaborators.
    pub fn from_parts(
        config: Settings,
        repositories: Repositories,
        backend: Arc<dyn CompletionBackend>,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        let gateway = ModelGateway::new(backend, config.model.malformed_content_policy);
        Self::assemble(config, repositories, gateway, billing)
    }

    fn assemble(
        config: Settings,
        repositories: Repositories,
        gateway: ModelGateway,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        let auth_service = Arc::new(AuthService::new(
            repositories.users.clone(),
            repositories.sessions.clone(),
            &config,
        ));
        let usage = Arc::new(UsageLedger::new(
            repositories.usage.clone(),
            config.usage.free_generation_limit,
        ));
        let content = Arc::new(ContentStore::new(repositories.posts.clone()));
        let generation = Arc::new(GenerationService::new(
            usage.clone(),
            Arc::new(gateway),
            content.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            billing,
            repositories.subscriptions.clone(),
            &config.billing,
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            config.billing.webhook_secret.clone(),
            config.billing.signature_tolerance_secs,
            SubscriptionLedger::new(repositories.subscriptions.clone(), repositories.users.clone()),
        ));

        Self {
            config: Arc::new(config),
            db: None,
            auth_service,
            usage,
            content,
            generation,
            subscriptions: repositories.subscriptions,
            checkout,
            webhooks,
        }
    }

    /// Periodic housekeeping: stale usage records and expired sessions.
    pub async fn run_maintenance(&self) -> Result<()> {
        self.usage.sweep_stale().await?;
        self.auth_service.cleanup_expired_sessions().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}

/// Registers every route on an app or test service.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(
            web::scope("/auth")
                .route("/sign-in", web::post().to(auth::handlers::sign_in))
                .route("/verify", web::post().to(auth::handlers::verify))
                .route("/logout", web::post().to(auth::handlers::logout)),
        )
        .service(
            web::scope("/api")
                .route("/generate", web::post().to(generation::handlers::generate))
                .route("/posts", web::get().to(content::handlers::list_posts))
                .route("/posts/{id}", web::get().to(content::handlers::get_post))
                .route("/posts/{id}", web::put().to(content::handlers::update_post))
                .route("/posts/{id}", web::delete().to(content::handlers::delete_post))
                .route("/posts/{id}/export", web::get().to(content::handlers::export_post))
                .route("/account", web::get().to(usage::handlers::account))
                .route("/billing/checkout", web::post().to(billing::handlers::checkout))
                .route("/billing/webhook", web::post().to(billing::handlers::webhook)),
        );
}
