use disco_billing::{
    AccessController, AppState, HttpIdentityProvider, PostgresBillingRepository,
    RedisSessionStore,
    config::{AppConfig, Env},
    create_router,
    identity::IdentityState,
    repository::RepositoryState,
    session::{SessionState, SessionStore},
};
use jsonwebtoken::Algorithm;
use sqlx::postgres::PgPoolOptions;
use std::{str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the billing database, the session store, the
/// identity client and the access policy, then serves HTTP. Any missing dependency
/// stops startup.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: pretty locally, JSON in production.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "disco_billing=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    Algorithm::from_str(&config.jwt_algorithm)
        .expect("FATAL: ALGORITHM is not a supported JWT algorithm.");

    // 3. Access policy
    let access = AccessController::from_file(&config.access_policy_path)
        .expect("FATAL: Failed to load the access policy. Check ACCESS_POLICY_PATH.");
    tracing::info!(path = %config.access_policy_path, "access policy loaded");

    // 4. Billing database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
    let repo = Arc::new(PostgresBillingRepository::new(pool)) as RepositoryState;

    // 5. Session store
    let redis = RedisSessionStore::connect(&config.redis_url)
        .await
        .expect("FATAL: Failed to connect to the session store. Check REDIS_URL.");
    match redis.health_check().await {
        Ok(true) => tracing::info!("session store reachable"),
        other => tracing::warn!(result = ?other, "session store health check failed"),
    }
    let sessions = Arc::new(redis) as SessionState;

    // 6. Identity server client
    let identity = Arc::new(
        HttpIdentityProvider::new(&config).expect("FATAL: Failed to build the HTTP client."),
    ) as IdentityState;

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        sessions,
        identity,
        access: Arc::new(access),
        config,
    };

    // 7. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the listen address. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
