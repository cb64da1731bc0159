use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Pages every signed-in user may see regardless of role. The router is wrapped in the
/// `require_session` layer, so handlers always receive a resolved `SessionUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /dashboard
        .route("/dashboard", get(handlers::get_dashboard))
}
