use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use snaplink_core::{ProviderId, ResolveError};

/// Ephemeral per-provider context: a client carrying the provider's cookie
/// jar and headers, any hidden tokens scraped at bootstrap, and the raw
/// config blob for providers that publish one. Process-memory only; rebuilt
/// on restart.
#[derive(Debug, Clone)]
pub struct SessionContext {
    client: reqwest::Client,
    tokens: HashMap<String, String>,
    blob: Option<String>,
    created: Instant,
}

impl SessionContext {
    pub fn new(
        client: reqwest::Client,
        tokens: HashMap<String, String>,
        blob: Option<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            blob,
            created: Instant::now(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn token(&self, key: &str) -> Option<&str> {
        self.tokens.get(key).map(String::as_str)
    }

    pub fn tokens(&self) -> &HashMap<String, String> {
        &self.tokens
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// Per-provider session cache with a freshness window.
///
/// Lifecycle: created on first `acquire`, refreshed on TTL expiry or explicit
/// invalidation, discarded on process shutdown. Readers clone the current
/// `Arc` and drop the lock; a refresh replaces the slot wholesale, so racing
/// refreshes settle on last-successful-refresh-wins. No lock is ever held
/// across a network call.
pub struct SessionManager {
    ttl: Duration,
    slots: RwLock<HashMap<ProviderId, Arc<SessionContext>>>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached, non-stale context for `id`, or run `bootstrap` and
    /// publish its result.
    pub async fn acquire<F, Fut>(
        &self,
        id: ProviderId,
        bootstrap: F,
    ) -> Result<Arc<SessionContext>, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionContext, ResolveError>>,
    {
        if let Some(context) = self.cached(id).await {
            return Ok(context);
        }

        let fresh = Arc::new(bootstrap().await?);
        engine_logging::engine_info!("bootstrapped session for {id}");
        self.slots.write().await.insert(id, Arc::clone(&fresh));
        Ok(fresh)
    }

    async fn cached(&self, id: ProviderId) -> Option<Arc<SessionContext>> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .filter(|context| context.age() < self.ttl)
            .cloned()
    }

    /// Drop the cached context so the next `acquire` refreshes. In-flight
    /// resolutions keep the `Arc` they already cloned.
    pub async fn invalidate(&self, id: ProviderId) {
        if self.slots.write().await.remove(&id).is_some() {
            engine_logging::engine_info!("invalidated session for {id}");
        }
    }
}
