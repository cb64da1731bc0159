use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    access::Role,
    config::AppConfig,
    error::AppError,
    session::{SESSION_COOKIE_NAME, SessionState, SessionStore},
};

/// Claims
///
/// Payload of the JWT issued by the identity server. Only `sub` is required by the
/// portal; `exp` is enforced when the issuer includes it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the username. Its suffix encodes the user's role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// verify_token
///
/// Checks the JWT signature with the shared secret and the configured algorithm and
/// returns the username carried in `sub`.
///
/// An expired token is reported as `SessionExpired` so the user lands back on the
/// welcome page; every other failure is a plain 401.
pub fn verify_token(token: &str, config: &AppConfig) -> Result<String, AppError> {
    let algorithm = Algorithm::from_str(&config.jwt_algorithm).map_err(|e| {
        tracing::error!(algorithm = %config.jwt_algorithm, error = %e, "unsupported JWT algorithm");
        AppError::Unauthorized("Invalid Token".to_string())
    })?;

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.leeway = 0;

    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::SessionExpired {
            redirect: config.welcome_url.clone(),
        },
        _ => {
            tracing::debug!(error = %e, "JWT rejected");
            AppError::Unauthorized("Invalid Token".to_string())
        }
    })?;

    token_data
        .claims
        .sub
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Token: Missing Username".to_string()))
}

/// SessionUser
///
/// The resolved identity of a request carrying a valid session cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub username: String,
    /// `None` when the username carries no recognised suffix. Such users may sign in
    /// and see the dashboard, but every gated function denies them.
    pub role: Option<Role>,
}

impl SessionUser {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        let role = Role::from_username(&username);
        Self { username, role }
    }

    /// Role label for display.
    pub fn role_label(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("unassigned")
    }
}

/// resolve_session
///
/// Looks the session cookie up in the store and rebuilds the identity from it.
pub async fn resolve_session(
    jar: &CookieJar,
    sessions: &dyn SessionStore,
    config: &AppConfig,
) -> Result<SessionUser, AppError> {
    let token = jar
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Not authenticated. Session token missing".to_string())
        })?;

    let payload = sessions
        .get(&token)
        .await
        .map_err(AppError::SessionStore)?
        .ok_or_else(|| AppError::SessionExpired {
            redirect: config.welcome_url.clone(),
        })?;

    if payload.username.is_empty() {
        return Err(AppError::Unauthorized(
            "Username missing in session token".to_string(),
        ));
    }

    Ok(SessionUser::new(payload.username))
}

/// SessionUser Extractor Implementation
///
/// Makes `SessionUser` usable as a handler argument. When a session middleware has
/// already resolved the user for this request, the cached identity is reused;
/// otherwise the cookie is resolved against the session store.
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<SessionUser>() {
            return Ok(user.clone());
        }

        let sessions = SessionState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        resolve_session(&jar, sessions.as_ref(), &config).await
    }
}

/// require_session
///
/// Middleware for routes open to every signed-in user. Rejects the request through the
/// `SessionUser` extractor and caches the identity in the request extensions.
pub async fn require_session(user: SessionUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign(claims: Value, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config() -> AppConfig {
        AppConfig {
            welcome_url: "https://welcome.test".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn token_without_exp_is_accepted() {
        let config = config();
        let token = sign(json!({ "sub": "ali_u1" }), Algorithm::HS256, &config.jwt_secret);

        assert_eq!(verify_token(&token, &config).unwrap(), "ali_u1");
    }

    #[test]
    fn token_with_past_exp_reports_expired_session() {
        let config = config();
        let token = sign(
            json!({ "sub": "ali_u1", "exp": now() - 5 }),
            Algorithm::HS256,
            &config.jwt_secret,
        );

        let err = verify_token(&token, &config).unwrap_err();
        assert!(
            matches!(err, AppError::SessionExpired { ref redirect } if redirect == "https://welcome.test")
        );
    }

    #[test]
    fn token_signed_with_other_algorithm_is_invalid() {
        let config = AppConfig {
            jwt_algorithm: "HS384".to_string(),
            ..config()
        };
        let token = sign(
            json!({ "sub": "ali_u1", "exp": now() + 60 }),
            Algorithm::HS256,
            &config.jwt_secret,
        );

        let err = verify_token(&token, &config).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref msg) if msg == "Invalid Token"));
    }

    #[test]
    fn unknown_algorithm_name_is_invalid() {
        let config = AppConfig {
            jwt_algorithm: "HS999".to_string(),
            ..config()
        };
        let token = sign(json!({ "sub": "ali_u1" }), Algorithm::HS256, &config.jwt_secret);

        assert!(matches!(
            verify_token(&token, &config),
            Err(AppError::Unauthorized(ref msg)) if msg == "Invalid Token"
        ));
    }

    #[test]
    fn empty_sub_is_missing_username() {
        let config = config();
        let token = sign(
            json!({ "sub": "", "exp": now() + 60 }),
            Algorithm::HS256,
            &config.jwt_secret,
        );

        let err = verify_token(&token, &config).unwrap_err();
        assert!(
            matches!(err, AppError::Unauthorized(ref msg) if msg == "Invalid Token: Missing Username")
        );
    }

    #[test]
    fn session_user_role_label() {
        assert_eq!(SessionUser::new("teller_u2").role_label(), "bank_cashier");
        assert_eq!(SessionUser::new("visitor").role_label(), "unassigned");
    }
}
