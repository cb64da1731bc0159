use axum::{
    Router,
    extract::{FromRef, MatchedPath, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod session;
pub mod templates;

// Routing grouped by gate (public, session only, session + access control).
pub mod routes;
use routes::{authenticated, billing, public};

// --- Public Re-exports ---

pub use access::{AccessController, Role};
pub use auth::SessionUser;
pub use config::AppConfig;
pub use error::AppError;
pub use identity::{HttpIdentityProvider, IdentityState};
pub use repository::{PostgresBillingRepository, RepositoryState};
pub use session::{MemorySessionStore, RedisSessionStore, SessionState};

/// ApiDoc
///
/// OpenAPI description of every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_index, handlers::oauth_callback, handlers::sign_out,
        handlers::get_dashboard, handlers::get_bill_payment, handlers::get_bill_retrieval,
        handlers::get_bill_adjustments, handlers::post_bill_payment,
        handlers::post_bill_retrieval, handlers::post_bill_adjustments
    ),
    components(
        schemas(models::PaymentForm, models::RetrievalForm, models::AdjustmentForm)
    ),
    tags(
        (name = "disco-billing", description = "Utility billing portal")
    )
)]
struct ApiDoc;

/// Shared access policy.
pub type AccessState = Arc<AccessController>;

/// AppState
///
/// Single, cheaply clonable container for every service a handler may need.
#[derive(Clone)]
pub struct AppState {
    /// Billing database (rows and stored functions).
    pub repo: RepositoryState,
    /// Server-side sessions with TTL.
    pub sessions: SessionState,
    /// OAuth code exchange against the identity server.
    pub identity: IdentityState,
    /// Role -> allowed functions.
    pub access: AccessState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AccessState {
    fn from_ref(app_state: &AppState) -> AccessState {
        app_state.access.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// access_gate
///
/// Middleware guarding the billing routes.
///
/// *Mechanism*: the `SessionUser` extractor rejects requests without a live session
/// (401, or a redirect to the welcome page once the session has expired). The matched
/// route path is then the function name checked against the access policy; a denied
/// role gets 403 before the handler runs. The resolved user is cached in the request
/// extensions for the handler.
async fn access_gate(
    State(access): State<AccessState>,
    user: SessionUser,
    matched: MatchedPath,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    access.authorize(&user, matched.as_str())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing structure, applies the session and access-control gates and
/// the observability layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_session,
            )),
        )
        .merge(
            billing::billing_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), access_gate)),
        )
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of one request carries its
/// `x-request-id`, method and URI.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
