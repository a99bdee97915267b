//! YouTube resolution through an mp3-converter helper site.
//!
//! The helper protects its API with the rotating cipher handled by the
//! signature module, and its protocol is the long one: init for a convert
//! URL, convert with an optional redirect chain, then poll a progress URL
//! until the conversion lands.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, now_millis, send_with_retry};
use crate::normalize::{clean_redirect_url, json_int, json_str, unescape_ampersands};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::{PollState, ResolveContext};
use crate::session::SessionContext;
use crate::signature::{derive_signing_token, extract_cipher_blob, parse_cipher_config, SigningKey};

const OUTPUT_FORMAT: &str = "mp3";

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtu\.be/([A-Za-z0-9_-]{11})",
        r"youtube\.com/shorts/([A-Za-z0-9_-]{11})",
        r"v=([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

pub(crate) struct YouTube;

#[async_trait]
impl ProviderStrategy for YouTube {
    fn id(&self) -> ProviderId {
        ProviderId::YouTube
    }

    async fn bootstrap(&self, cx: &ResolveContext<'_>) -> Result<SessionContext, ResolveError> {
        let client = http::session_client(self.spec(), cx.settings)?;
        let response = send_with_retry(cx.settings, cx.cancel, || {
            client.get(format!("{}/", cx.endpoints.page))
        })
        .await?;
        let html = expect_success(response)?
            .text()
            .await
            .map_err(http::map_reqwest_error)?;
        let blob = extract_cipher_blob(&html)?;
        Ok(SessionContext::new(client, HashMap::new(), Some(blob)))
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let key = signing_key(session)?;
        let video_id = video_id_from(source)?;
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");

        // Init: the helper hands out a convert URL bound to the signature.
        let init = request_json(cx, session, format!("{}/api/v1/init", cx.endpoints.api), &[
            ("k", key.query_value()),
            ("_", now_millis()),
        ])
        .await?;
        if json_int(&init, "error") > 0 {
            return Err(ResolveError::conversion(format!(
                "init reported error code {}",
                json_int(&init, "error")
            )));
        }
        let mut convert_url = json_str(&init, "convertURL")
            .ok_or_else(|| ResolveError::parse("init response has no convertURL"))?
            .to_string();

        // Convert, following the helper's redirect chain up to the cap.
        let mut hops = 0usize;
        let converted = loop {
            let payload = request_json(cx, session, convert_url.clone(), &[
                ("v", watch_url.clone()),
                ("f", OUTPUT_FORMAT.to_string()),
                ("_", now_millis()),
                ("k", key.query_value()),
            ])
            .await?;

            if json_int(&payload, "redirect") == 1 {
                hops += 1;
                if hops > cx.settings.redirect_hop_limit {
                    return Err(ResolveError::upstream(format!(
                        "convert redirect chain exceeded {} hops",
                        cx.settings.redirect_hop_limit
                    )));
                }
                let next = json_str(&payload, "redirectURL")
                    .ok_or_else(|| ResolveError::parse("redirect response has no redirectURL"))?;
                convert_url = clean_redirect_url(next);
                engine_logging::engine_debug!("following convert redirect hop {hops}");
                continue;
            }
            break payload;
        };

        let download_url = json_str(&converted, "downloadURL")
            .ok_or_else(|| ResolveError::parse("convert response has no downloadURL"))?
            .to_string();
        let progress_url = json_str(&converted, "progressURL")
            .ok_or_else(|| ResolveError::parse("convert response has no progressURL"))?
            .to_string();

        // Poll until the conversion reports done, an error code, or the
        // attempt budget runs out.
        let mut poll = PollState::new(progress_url, cx.settings);
        let finished = loop {
            let payload = request_json(cx, session, poll.progress_url.clone(), &[
                ("_", now_millis()),
                ("k", key.query_value()),
            ])
            .await?;

            let error = json_int(&payload, "error");
            if error > 0 {
                return Err(ResolveError::conversion(format!(
                    "upstream reported conversion error code {error}"
                )));
            }
            if json_int(&payload, "progress") >= 3 {
                break payload;
            }
            if !poll.bump() {
                return Err(ResolveError::poll_timeout(format!(
                    "conversion incomplete after {} polls",
                    poll.max_attempts
                )));
            }
            http::sleep_cancellable(poll.interval, cx.cancel).await?;
        };

        Ok(RawPayload::Json(json!({
            "title": json_str(&finished, "title").unwrap_or_default(),
            "downloadURL": download_url,
            "format": OUTPUT_FORMAT,
        })))
    }

    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError> {
        let value = payload.as_json()?;
        let download_url = json_str(value, "downloadURL")
            .ok_or_else(|| ResolveError::parse("payload has no downloadURL"))?;
        Ok(MediaData {
            title: json_str(value, "title").unwrap_or_default().to_string(),
            formats: vec![FormatVariant {
                quality: OUTPUT_FORMAT.to_string(),
                container: OUTPUT_FORMAT.to_string(),
                size_bytes: None,
                download_url: download_url.to_string(),
                has_video: false,
                has_audio: true,
                note: format_note(false, true, OUTPUT_FORMAT),
            }],
            ..MediaData::default()
        })
    }
}

fn signing_key(session: &SessionContext) -> Result<SigningKey, ResolveError> {
    let blob = session
        .blob()
        .ok_or_else(|| ResolveError::signature("session carries no cipher blob"))?;
    let config = parse_cipher_config(blob)?;
    derive_signing_token(&config)
}

fn video_id_from(source: &SourceUrl) -> Result<String, ResolveError> {
    for pattern in VIDEO_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(source.as_str()) {
            return Ok(captures[1].to_string());
        }
    }
    Err(ResolveError::input(format!(
        "no video id in URL {}",
        source.as_str()
    )))
}

async fn request_json(
    cx: &ResolveContext<'_>,
    session: &SessionContext,
    url: String,
    query: &[(&str, String)],
) -> Result<Value, ResolveError> {
    let response = send_with_retry(cx.settings, cx.cancel, || {
        session.client().get(&url).query(query)
    })
    .await?;
    let text = expect_success(response)?
        .text()
        .await
        .map_err(http::map_reqwest_error)?;
    serde_json::from_str(&unescape_ampersands(&text))
        .map_err(|err| ResolveError::parse(format!("response was not JSON: {err}")))
}
