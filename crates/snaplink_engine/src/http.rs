use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use tokio_util::sync::CancellationToken;

use snaplink_core::{ProviderId, ProviderSpec, ResolveError, DEFAULT_USER_AGENT};

/// Engine-wide tunables. One instance per `Resolver`; tests shrink the
/// durations to keep wall-clock time in the milliseconds.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub connect_timeout: Duration,
    /// Per network call; a call exceeding it fails that attempt, not the
    /// whole resolution.
    pub request_timeout: Duration,
    /// Transport-level attempts per call before the resolution fails.
    pub retry_budget: usize,
    pub retry_delay: Duration,
    /// Cap on convert-URL redirect hops; guards against redirect loops.
    pub redirect_hop_limit: usize,
    pub poll_interval: Duration,
    pub poll_max_attempts: usize,
    /// Freshness window of a cached per-provider session.
    pub session_ttl: Duration,
    /// Per-provider endpoint overrides, mainly for tests pointing a
    /// provider at a stub server.
    pub endpoint_overrides: HashMap<ProviderId, Endpoints>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            retry_budget: 3,
            retry_delay: Duration::from_secs(2),
            redirect_hop_limit: 3,
            poll_interval: Duration::from_secs(3),
            poll_max_attempts: 20,
            session_ttl: Duration::from_secs(600),
            endpoint_overrides: HashMap::new(),
        }
    }
}

/// Where a provider's page and API hosts actually live for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub page: String,
    pub api: String,
}

impl EngineSettings {
    pub fn endpoints_for(&self, spec: &ProviderSpec) -> Endpoints {
        self.endpoint_overrides
            .get(&spec.id)
            .cloned()
            .unwrap_or_else(|| Endpoints {
                page: spec.base_url.to_string(),
                api: spec.api_url().to_string(),
            })
    }

    /// Point both the page and API host of a provider at `base`.
    pub fn override_endpoints(&mut self, id: ProviderId, base: impl Into<String>) {
        let base = base.into();
        self.endpoint_overrides.insert(
            id,
            Endpoints {
                page: base.clone(),
                api: base,
            },
        );
    }
}

fn default_headers(spec: &ProviderSpec) -> Result<HeaderMap, ResolveError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(DEFAULT_USER_AGENT),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Some(origin) = spec.origin {
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(origin));
    }
    if let Some(referer) = spec.referer {
        headers.insert(reqwest::header::REFERER, HeaderValue::from_static(referer));
    }
    for (name, value) in spec.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ResolveError::upstream(format!("bad header name: {err}")))?;
        headers.insert(name, HeaderValue::from_static(value));
    }
    Ok(headers)
}

fn builder(spec: &ProviderSpec, settings: &EngineSettings) -> Result<reqwest::ClientBuilder, ResolveError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .default_headers(default_headers(spec)?)
        .cookie_store(true))
}

/// Client carrying the provider's default headers and a cookie jar; follows
/// redirects with reqwest's stock limit.
pub(crate) fn session_client(
    spec: &ProviderSpec,
    settings: &EngineSettings,
) -> Result<reqwest::Client, ResolveError> {
    builder(spec, settings)?
        .build()
        .map_err(|err| ResolveError::upstream(err.to_string()))
}

/// Same as `session_client` but never follows a redirect; used where the
/// `Location` header itself is the payload.
pub(crate) fn no_redirect_client(
    spec: &ProviderSpec,
    settings: &EngineSettings,
) -> Result<reqwest::Client, ResolveError> {
    builder(spec, settings)?
        .redirect(Policy::none())
        .build()
        .map_err(|err| ResolveError::upstream(err.to_string()))
}

/// Send a request, retrying transport failures up to the retry budget.
/// Non-2xx responses are returned to the caller untouched; status policy is
/// per call site.
pub(crate) async fn send_with_retry<F>(
    settings: &EngineSettings,
    cancel: &CancellationToken,
    mut request: F,
) -> Result<reqwest::Response, ResolveError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_error = None;
    for attempt in 0..settings.retry_budget.max(1) {
        if attempt > 0 {
            sleep_cancellable(settings.retry_delay, cancel).await?;
        }
        let send = request().send();
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ResolveError::upstream("resolution cancelled"));
            }
            result = send => match result {
                Ok(response) => return Ok(response),
                Err(err) => {
                    engine_logging::engine_warn!(
                        "request attempt {} failed: {err}",
                        attempt + 1
                    );
                    last_error = Some(map_reqwest_error(err));
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ResolveError::upstream("retry budget exhausted")))
}

/// Reject non-2xx responses. The status code is kept in the message so the
/// orchestrator can spot authentication rejections (401/403) and refresh the
/// session.
pub(crate) fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ResolveError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ResolveError::upstream(format!(
            "unexpected upstream status {}",
            status.as_u16()
        )))
    }
}

pub(crate) fn is_auth_rejection(err: &ResolveError) -> bool {
    err.kind == snaplink_core::ErrorKind::UpstreamUnavailable
        && (err.message.contains("status 401") || err.message.contains("status 403"))
}

pub(crate) async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), ResolveError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ResolveError::upstream("resolution cancelled")),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ResolveError {
    if err.is_timeout() {
        return ResolveError::upstream(format!("request timed out: {err}"));
    }
    if err.is_redirect() {
        return ResolveError::upstream(format!("redirect limit exceeded: {err}"));
    }
    ResolveError::upstream(err.to_string())
}

/// Millisecond wall-clock timestamp, the `_` query parameter several
/// upstreams expect.
pub(crate) fn now_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
