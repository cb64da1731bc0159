use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// AppError
///
/// Every failure a handler or extractor can surface. Each variant maps to exactly one
/// HTTP response shape; the JSON body always carries a single `detail` field.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// The session (or the identity token) is no longer valid. Users are sent back
    /// to the welcome page to sign in again instead of seeing an error body.
    #[error("Token has expired")]
    SessionExpired { redirect: String },

    #[error("Forbidden")]
    Forbidden,

    #[error("Error fetching token: {0}")]
    Upstream(String),

    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::SessionExpired { .. } => StatusCode::FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Upstream(_)
            | AppError::SessionStore(_)
            | AppError::Database(_)
            | AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            AppError::SessionExpired { redirect } => {
                return found(redirect);
            }
            AppError::SessionStore(_) | AppError::Database(_) | AppError::Template(_) => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// found
///
/// A plain 302 redirect. `axum::response::Redirect` only offers 303/307/308, while the
/// browser-facing sign-in flow expects 302.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
