use std::time::Duration;

use tokio_util::sync::CancellationToken;

use snaplink_core::{
    extract_for, spec_for, ErrorKind, MediaData, MediaResult, ProtocolShape, ProviderId,
    ResolveError,
};

use crate::http::{self, Endpoints, EngineSettings};
use crate::providers::strategy_for;
use crate::session::SessionManager;

/// Everything a provider strategy needs while driving one resolution.
pub(crate) struct ResolveContext<'a> {
    pub settings: &'a EngineSettings,
    pub cancel: &'a CancellationToken,
    /// Page/API hosts for this provider, with test overrides applied.
    pub endpoints: Endpoints,
}

/// Transient progress-polling state for one resolution; dropped when the
/// resolution terminates.
pub(crate) struct PollState {
    pub progress_url: String,
    pub attempts: usize,
    pub max_attempts: usize,
    pub interval: Duration,
}

impl PollState {
    pub(crate) fn new(progress_url: String, settings: &EngineSettings) -> Self {
        Self {
            progress_url,
            attempts: 0,
            max_attempts: settings.poll_max_attempts,
            interval: settings.poll_interval,
        }
    }

    /// Count one completed, unsuccessful poll. `false` once the budget is
    /// spent, which bounds the loop at `max_attempts * interval` wall-clock.
    pub(crate) fn bump(&mut self) -> bool {
        self.attempts += 1;
        self.attempts < self.max_attempts
    }
}

/// The multi-provider resolution engine.
///
/// One instance serves any number of concurrent resolutions; the only shared
/// mutable state is the per-provider session cache.
pub struct Resolver {
    settings: EngineSettings,
    sessions: SessionManager,
}

impl Resolver {
    pub fn new(settings: EngineSettings) -> Self {
        let sessions = SessionManager::new(settings.session_ttl);
        Self { settings, sessions }
    }

    /// Resolve free-form text against one provider. Never fails: input and
    /// upstream-classified failures come back as `status == Error`.
    pub async fn resolve(&self, provider: ProviderId, text: &str) -> MediaResult {
        self.resolve_with_cancel(provider, text, CancellationToken::new())
            .await
    }

    /// As `resolve`, with a caller-supplied cancellation token. Cancelling
    /// aborts in-flight calls and poll sleeps promptly; nothing keeps
    /// running past it.
    pub async fn resolve_with_cancel(
        &self,
        provider: ProviderId,
        text: &str,
        cancel: CancellationToken,
    ) -> MediaResult {
        match self.try_resolve_inner(provider, text, &cancel).await {
            Ok(data) => MediaResult::success("media resolved", data),
            Err(error) => {
                engine_logging::engine_info!("resolution for {provider} failed: {error}");
                MediaResult::failure(&error)
            }
        }
    }

    /// Resolve under a deadline. When it passes, in-flight calls and the
    /// poll loop are cancelled promptly and an upstream-class error result
    /// comes back; no work keeps running past the deadline.
    pub async fn resolve_with_deadline(
        &self,
        provider: ProviderId,
        text: &str,
        deadline: Duration,
    ) -> MediaResult {
        let cancel = CancellationToken::new();
        tokio::select! {
            result = self.resolve_with_cancel(provider, text, cancel.clone()) => result,
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                MediaResult::failure(&ResolveError::upstream(format!(
                    "deadline of {deadline:?} exceeded"
                )))
            }
        }
    }

    /// Detect the provider from the text itself, then resolve.
    pub async fn resolve_any(&self, text: &str) -> MediaResult {
        match snaplink_core::extract_source(text) {
            Ok(source) => self.resolve(source.provider, text).await,
            Err(error) => MediaResult::failure(&error),
        }
    }

    /// Error-kind-preserving variant for callers that branch on the kind.
    pub async fn try_resolve(
        &self,
        provider: ProviderId,
        text: &str,
    ) -> Result<MediaData, ResolveError> {
        self.try_resolve_inner(provider, text, &CancellationToken::new())
            .await
    }

    async fn try_resolve_inner(
        &self,
        provider: ProviderId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<MediaData, ResolveError> {
        let spec = spec_for(provider);
        // Pure; an Input failure short-circuits before any network I/O.
        let source = extract_for(text, spec)?;
        let strategy = strategy_for(provider);
        let cx = ResolveContext {
            settings: &self.settings,
            cancel,
            endpoints: self.settings.endpoints_for(spec),
        };

        let session = self
            .sessions
            .acquire(provider, || strategy.bootstrap(&cx))
            .await?;

        let payload = match strategy.orchestrate(&cx, &session, &source).await {
            Ok(payload) => payload,
            Err(error) if refresh_worthy(spec.shape, &error) => {
                engine_logging::engine_info!(
                    "{provider} rejected the session ({error}); refreshing and retrying once"
                );
                self.sessions.invalidate(provider).await;
                let fresh = self
                    .sessions
                    .acquire(provider, || strategy.bootstrap(&cx))
                    .await?;
                strategy.orchestrate(&cx, &fresh, &source).await?
            }
            Err(error) => return Err(error),
        };

        strategy.normalize(&payload)
    }
}

/// Refresh-then-retry-once policy: scrape providers refresh on an
/// authentication rejection, and a failed signature derivation always gets
/// one shot at a freshly published configuration. Whether the refreshed
/// token actually differs is deliberately not checked.
fn refresh_worthy(shape: ProtocolShape, error: &ResolveError) -> bool {
    match error.kind {
        ErrorKind::SignatureDerivation => true,
        _ => shape == ProtocolShape::Scrape && http::is_auth_rejection(error),
    }
}
