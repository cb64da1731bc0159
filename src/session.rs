use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE_NAME: &str = "session_token";

/// SessionPayload
///
/// What the store keeps per session token. The role is always re-derived from the
/// username on each request, so the stored value is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub username: String,
    pub role: Option<String>,
}

impl SessionPayload {
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: None,
        }
    }
}

/// Generates an opaque session token.
pub fn new_session_token() -> String {
    Uuid::new_v4().to_string()
}

/// SessionStore
///
/// Key-value contract with per-key time-to-live. Implemented by Redis in production
/// and by an in-memory map in tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores `payload` under `token`, replacing any previous value. The entry
    /// disappears once `ttl` has elapsed.
    async fn put(&self, token: &str, payload: &SessionPayload, ttl: Duration)
    -> Result<(), String>;

    /// Returns the payload if the token is known and has not expired.
    async fn get(&self, token: &str) -> Result<Option<SessionPayload>, String>;

    /// Removes the token. Unknown tokens are not an error.
    async fn delete(&self, token: &str) -> Result<(), String>;

    async fn health_check(&self) -> Result<bool, String>;
}

/// SessionState
///
/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<dyn SessionStore>;

/// RedisSessionStore
///
/// Redis-backed store. Uses a `ConnectionManager` for multiplexed connections with
/// automatic reconnection; TTLs are enforced by Redis itself via `SETEX`.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection_manager: redis::aio::ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self, String> {
        let client = redis::Client::open(url)
            .map_err(|e| format!("Failed to create Redis client: {}", e))?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| format!("Failed to connect to Redis: {}", e))?;

        tracing::debug!(url = %redact_url(url), "session store connected");

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(
        &self,
        token: &str,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), String> {
        let mut conn = self.connection_manager.clone();
        let value = serde_json::to_string(payload).map_err(|e| e.to_string())?;
        // SETEX rejects a zero TTL.
        let ttl_seconds = ttl.as_secs().max(1);

        redis::cmd("SETEX")
            .arg(token)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| format!("Redis SETEX failed: {}", e))
    }

    async fn get(&self, token: &str) -> Result<Option<SessionPayload>, String> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(|e| format!("Redis GET failed: {}", e))?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| format!("corrupt session payload: {}", e)),
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> Result<(), String> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("DEL")
            .arg(token)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| format!("Redis DEL failed: {}", e))
    }

    async fn health_check(&self) -> Result<bool, String> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| format!("Redis PING failed: {}", e))?;
        Ok(pong == "PONG")
    }
}

/// Redact credentials from a Redis URL for logging.
fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            return format!("{}***{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

/// MemorySessionStore
///
/// In-process implementation of `SessionStore` used for testing. Entries carry their
/// own deadline and are treated as absent (and evicted) once it has passed.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<HashMap<String, (SessionPayload, Instant)>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(
        &self,
        token: &str,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), String> {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(token.to_string(), (payload.clone(), deadline));
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<SessionPayload>, String> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(token) {
            Some((payload, deadline)) if *deadline > Instant::now() => {
                return Ok(Some(payload.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(token);
        }
        Ok(None)
    }

    async fn delete(&self, token: &str) -> Result<(), String> {
        self.entries.lock().await.remove(token);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, String> {
        Ok(true)
    }
}
