use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session. The OAuth callback accepts both GET and POST
/// since identity servers differ in how they return the authorization code.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // Welcome page with the sign-in link.
        .route("/", get(handlers::get_index))
        // GET|POST /callback?code=...
        // Authorization code exchange, session issuance and cookie setup.
        .route(
            "/callback",
            get(handlers::oauth_callback).post(handlers::oauth_callback),
        )
        // GET /sign-out
        // Deletes the session and clears the cookie.
        .route("/sign-out", get(handlers::sign_out))
}
