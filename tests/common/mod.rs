#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use blogcraft_server::auth::SessionGrant;
use blogcraft_server::billing::{BillingProvider, CheckoutRequest};
use blogcraft_server::db::{MemoryStore, Repositories, UsageRepository};
use blogcraft_server::error::{BillingError, GatewayError};
use blogcraft_server::gateway::{ChatMessage, CompletionBackend, ResponseFormat};
use blogcraft_server::{AppState, Settings};

pub const VALID_BLOG: &str = r###"{
    "introduction": "Rust is fast.",
    "body": "## Why\n\nBecause of zero-cost abstractions.",
    "conclusion": "Try it.",
    "seo": {
        "keywordDensity": {"rust": 2.5},
        "metaTitle": "Why Rust",
        "metaDescription": "A short case for Rust",
        "readability": "Grade 8"
    }
}"###;

/// Builds an actix test service over `$state` with every route registered.
#[allow(unused_macros)]
macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(blogcraft_server::configure_routes),
        )
        .await
    };
}

enum Script {
    Answer(String),
    Status { status: u16, body: String },
}

/// Answers every completion with the current script: either a text answer
/// or an upstream error status.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(answer: &str) -> Self {
        Self { script: Mutex::new(Script::Answer(answer.to_string())), calls: AtomicUsize::new(0) }
    }

    pub fn answer_with(&self, answer: &str) {
        *self.script.lock().unwrap() = Script::Answer(answer.to_string());
    }

    pub fn fail_with_status(&self, status: u16, body: &str) {
        *self.script.lock().unwrap() = Script::Status { status, body: body.to_string() };
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _format: ResponseFormat,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.script.lock().unwrap() {
            Script::Answer(answer) => Ok(answer.clone()),
            Script::Status { status, body } => {
                Err(GatewayError::Status { status: *status, body: body.clone() })
            }
        }
    }
}

#[derive(Default)]
pub struct FakeBillingProvider {
    pub customers_created: AtomicUsize,
    pub sessions: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl BillingProvider for FakeBillingProvider {
    async fn create_customer(&self, _email: &str, _user_id: Uuid) -> Result<String, BillingError> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_test_{n}"))
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError> {
        self.sessions.lock().unwrap().push(request.clone());
        Ok(format!("https://checkout.stripe.test/{}", request.customer_id))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub billing: Arc<FakeBillingProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::new_for_test().expect("test settings"))
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(ScriptedBackend::new(VALID_BLOG));
        let billing = Arc::new(FakeBillingProvider::default());
        let state = AppState::from_parts(
            settings,
            Repositories::from_backend(store.clone()),
            backend.clone(),
            billing.clone(),
        );
        Self { state, store, backend, billing }
    }

    /// Runs the email sign-in flow and returns the session.
    pub async fn sign_in(&self, email: &str) -> SessionGrant {
        let link = self.state.auth_service.request_sign_in(email).await.unwrap();
        let url = url::Url::parse(&link.url).unwrap();
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        self.state.auth_service.verify_sign_in(email, &token).await.unwrap()
    }

    pub async fn set_usage(&self, user_id: Uuid, count: u32) {
        let period = self.state.usage.current_period();
        for _ in 0..count {
            self.store.increment(user_id, period).await.unwrap();
        }
    }

    pub async fn usage(&self, user_id: Uuid) -> u32 {
        self.state.usage.current_count(user_id).await.unwrap()
    }
}

pub fn bearer(grant: &SessionGrant) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", grant.token))
}
