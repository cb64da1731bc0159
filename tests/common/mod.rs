#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::NaiveDateTime;
use disco_billing::{
    AccessController, AppConfig, AppError, AppState, MemorySessionStore, create_router,
    identity::IdentityProvider,
    models::{AdjustmentRequest, BillData, RetrievalForm},
    repository::{BillingRepository, RepoResult},
    session::{SessionPayload, SessionStore},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

pub const POLICY: &str = r#"
[roles]
customer = ["/bill-retrieval", "/bill-payment"]
bank_cashier = ["/bill-payment"]
disco_employee = ["/bill-retrieval", "/bill-adjustments"]
"#;

// --- Mock Billing Repository ---

/// Scripted stand-in for the billing database. Records the stored-function calls it
/// receives so tests can assert on what the handlers sent.
pub struct MockBillingRepo {
    /// bill_id -> amount due before the due date
    pub bills: HashMap<i64, f64>,
    pub payment_status: Option<String>,
    pub payment_method_description: Option<String>,
    pub payment_result: i32,
    pub adjust_result: i32,
    pub bill_data: Option<BillData>,
    pub fail_bill_data: bool,

    pub payments: Mutex<Vec<(i64, i64, f64)>>,
    pub adjustments: Mutex<Vec<AdjustmentRequest>>,
}

impl Default for MockBillingRepo {
    fn default() -> Self {
        Self {
            bills: HashMap::new(),
            payment_status: None,
            payment_method_description: Some("Credit Card".to_string()),
            payment_result: 1,
            adjust_result: 1,
            bill_data: None,
            fail_bill_data: false,
            payments: Mutex::new(vec![]),
            adjustments: Mutex::new(vec![]),
        }
    }
}

impl MockBillingRepo {
    pub fn with_bill(bill_id: i64, amount_due: f64) -> Self {
        let mut repo = Self::default();
        repo.bills.insert(bill_id, amount_due);
        repo
    }
}

#[async_trait]
impl BillingRepository for MockBillingRepo {
    async fn bill_exists(&self, bill_id: i64) -> RepoResult<bool> {
        Ok(self.bills.contains_key(&bill_id))
    }
    async fn bill_amount_due(&self, bill_id: i64) -> RepoResult<Option<f64>> {
        Ok(self.bills.get(&bill_id).copied())
    }
    async fn payment_status(&self, _bill_id: i64) -> RepoResult<Option<String>> {
        Ok(self.payment_status.clone())
    }
    async fn payment_method_description(&self, _id: i64) -> RepoResult<Option<String>> {
        Ok(self.payment_method_description.clone())
    }
    async fn process_payment(
        &self,
        bill_id: i64,
        _paid_at: NaiveDateTime,
        payment_method_id: i64,
        amount: f64,
    ) -> RepoResult<i32> {
        self.payments
            .lock()
            .unwrap()
            .push((bill_id, payment_method_id, amount));
        Ok(self.payment_result)
    }
    async fn adjust_bill(&self, adjustment: &AdjustmentRequest) -> RepoResult<i32> {
        self.adjustments.lock().unwrap().push(adjustment.clone());
        Ok(self.adjust_result)
    }
    async fn bill_data(&self, _query: &RetrievalForm) -> RepoResult<Option<BillData>> {
        if self.fail_bill_data {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self.bill_data.clone())
    }
}

// --- Stub Identity Server ---

pub enum StubIdentity {
    /// Hands out this JWT for any code.
    Token(String),
    /// Replies without a token.
    NoToken,
    /// Simulates a transport failure.
    Unreachable,
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn exchange_code(&self, _code: &str) -> Result<String, AppError> {
        match self {
            StubIdentity::Token(t) => Ok(t.clone()),
            StubIdentity::NoToken => Err(AppError::Unauthorized(
                "Failed to retrieve token.".to_string(),
            )),
            StubIdentity::Unreachable => Err(AppError::Upstream(
                "error sending request for url (https://auth.test/token)".to_string(),
            )),
        }
    }
}

// --- Helpers ---

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Signs a JWT with the given secret. `exp_offset` is relative to now, in seconds.
pub fn mint_token(secret: &str, sub: Option<&str>, exp_offset: i64) -> String {
    let now = now_secs();
    let mut claims = json!({
        "iat": now,
        "exp": now + exp_offset,
    });
    if let Some(sub) = sub {
        claims["sub"] = json!(sub);
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub sessions: MemorySessionStore,
    pub repo: Arc<MockBillingRepo>,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new(repo: MockBillingRepo, identity: StubIdentity) -> Self {
        let config = AppConfig {
            welcome_url: "https://welcome.test".to_string(),
            ..AppConfig::default()
        };
        let sessions = MemorySessionStore::new();
        let repo = Arc::new(repo);

        let state = AppState {
            repo: repo.clone(),
            sessions: Arc::new(sessions.clone()),
            identity: Arc::new(identity),
            access: Arc::new(AccessController::from_toml_str(POLICY).unwrap()),
            config: config.clone(),
        };

        Self {
            router: create_router(state),
            sessions,
            repo,
            config,
        }
    }

    pub fn with_repo(repo: MockBillingRepo) -> Self {
        Self::new(repo, StubIdentity::NoToken)
    }

    /// Stores a session for `username` and returns its token.
    pub async fn sign_in(&self, username: &str) -> String {
        let token = format!("token-{}", username);
        self.sessions
            .put(
                &token,
                &SessionPayload::for_user(username),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        token
    }
}

pub fn get(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("session_token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("session_token={}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn detail(response: Response<Body>) -> String {
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    body["detail"].as_str().unwrap().to_string()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

pub fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .unwrap()
        .to_string()
}
