use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::{config::{AppConfig, Env}, error::AppError};

/// IdentityProvider
///
/// Contract for the external OAuth server: trades a one-time authorization code for
/// a signed JWT. Handlers only see this trait, so tests can substitute a stub.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<String, AppError>;
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;

/// Reply of the token endpoint. Only the `token` field is used.
#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// HttpIdentityProvider
///
/// Talks to `POST https://{auth_server}/token` with form-encoded client credentials.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        // The development identity server runs with a self-signed certificate.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.env == Env::Local)
            .build()?;

        Ok(Self {
            client,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Points the client at a different token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let form = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Failed to retrieve token.".to_string()))
    }
}
