//! One strategy per upstream helper site. The strategies share the
//! bootstrap/orchestrate/normalize contract; the resolver selects one by
//! provider id, so every provider runs through the same pipeline instead of
//! duplicating it.

mod douyin;
mod easylink;
mod qishui;
mod spotify;
mod tiktok;
mod twitter;
mod youtube;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use snaplink_core::{spec_for, MediaData, ProviderId, ProviderSpec, ResolveError, SourceUrl};

use crate::http;
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

/// What an upstream handed back, before normalization.
#[derive(Debug, Clone)]
pub(crate) enum RawPayload {
    Json(Value),
    Html(String),
}

impl RawPayload {
    pub(crate) fn as_json(&self) -> Result<&Value, ResolveError> {
        match self {
            RawPayload::Json(value) => Ok(value),
            RawPayload::Html(_) => Err(ResolveError::parse("expected a JSON payload")),
        }
    }

    pub(crate) fn as_html(&self) -> Result<&str, ResolveError> {
        match self {
            RawPayload::Html(html) => Ok(html),
            RawPayload::Json(_) => Err(ResolveError::parse("expected an HTML payload")),
        }
    }
}

#[async_trait]
pub(crate) trait ProviderStrategy: Send + Sync {
    fn id(&self) -> ProviderId;

    fn spec(&self) -> &'static ProviderSpec {
        spec_for(self.id())
    }

    /// Establish the ephemeral session: cookies, hidden tokens, config
    /// blob. The default suits providers that only need a ready client.
    async fn bootstrap(&self, cx: &ResolveContext<'_>) -> Result<SessionContext, ResolveError> {
        let client = http::session_client(self.spec(), cx.settings)?;
        Ok(SessionContext::new(client, HashMap::new(), None))
    }

    /// Drive the provider's protocol to a final raw payload.
    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError>;

    /// Map the raw payload into canonical media data. Pure; all I/O happens
    /// in `orchestrate`.
    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError>;
}

pub(crate) fn strategy_for(id: ProviderId) -> &'static dyn ProviderStrategy {
    match id {
        ProviderId::YouTube => &youtube::YouTube,
        ProviderId::Twitter => &twitter::Twitter,
        ProviderId::TikTok => &tiktok::TikTok,
        ProviderId::Douyin => &douyin::Douyin,
        ProviderId::Qishui => &qishui::Qishui,
        ProviderId::Spotify => &spotify::Spotify,
        ProviderId::EasyLink => &easylink::EasyLink,
    }
}
