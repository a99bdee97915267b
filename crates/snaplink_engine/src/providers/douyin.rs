//! Douyin resolution through a WordPress-based helper: a hidden page token
//! plus a homegrown request hash unlock a JSON endpoint, and each reported
//! media then has its real download URL resolved through the helper's
//! download relay.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, send_with_retry};
use crate::normalize::{json_int, json_str};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

const API_PATH: &str = "/wp-json/mx-downloader/video-data/";
const RELAY_PATH: &str = "/wp-content/plugins/aio-video-downloader/download.php";
const HASH_SALT: &str = "aio-dl";

// The regex crate has no backreferences, so the quote styles get one
// pattern each.
static SCRIPT_TOKEN_DOUBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"token["\s:]+"([^"]+)""#).unwrap());
static SCRIPT_TOKEN_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"token["\s:]+'([^']+)'"#).unwrap());

pub(crate) struct Douyin;

#[async_trait]
impl ProviderStrategy for Douyin {
    fn id(&self) -> ProviderId {
        ProviderId::Douyin
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

        let token = page_token(&html)
            .ok_or_else(|| ResolveError::upstream("token marker missing from helper page"))?;
        let mut tokens = HashMap::new();
        tokens.insert("token".to_string(), token);
        Ok(SessionContext::new(client, tokens, None))
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let url = source.as_str();
        let form = [
            ("url", url),
            ("token", session.token("token").unwrap_or_default()),
            ("hash", &request_hash(url)),
        ];
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session
                .client()
                .post(format!("{}{API_PATH}", cx.endpoints.api))
                .form(&form)
        })
        .await?;
        // A 403 here means the page token went stale; expect_success keeps
        // the status visible so the resolver can refresh and retry once.
        let result: Value = expect_success(response)?
            .json()
            .await
            .map_err(|err| ResolveError::parse(format!("response was not JSON: {err}")))?;

        let medias = result
            .get("medias")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolveError::parse("no media found in response"))?;

        // Resolve each media's real download URL through the relay before
        // normalization; the listing URLs themselves are placeholders.
        let mut enriched = Vec::with_capacity(medias.len());
        for (index, media) in medias.iter().enumerate() {
            let mut media = media.clone();
            if json_str(&media, "url").is_some_and(|u| !u.is_empty()) {
                if let Some(real) = self.resolve_media_url(cx, session, index).await? {
                    media["resolvedURL"] = Value::String(real);
                }
            }
            enriched.push(media);
        }

        let mut payload = result.clone();
        payload["medias"] = json!(enriched);
        Ok(RawPayload::Json(payload))
    }

    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError> {
        let value = payload.as_json()?;
        let medias = value
            .get("medias")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolveError::parse("no media found in response"))?;

        let mut formats = Vec::new();
        for media in medias {
            let Some(download_url) = json_str(media, "resolvedURL") else {
                continue;
            };
            let quality = json_str(media, "quality").unwrap_or_default().to_string();
            let has_video = media
                .get("videoAvailable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let has_audio = media
                .get("audioAvailable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let size = json_int(media, "size");
            formats.push(FormatVariant {
                note: format_note(has_video, has_audio, &quality),
                quality,
                container: json_str(media, "extension").unwrap_or_default().to_string(),
                size_bytes: (size > 0).then_some(size as u64),
                download_url: download_url.to_string(),
                has_video,
                has_audio,
            });
        }
        if formats.is_empty() {
            return Err(ResolveError::parse("no downloadable formats in response"));
        }

        Ok(MediaData {
            title: json_str(value, "title").unwrap_or_default().to_string(),
            author: json_str(value, "author").unwrap_or_default().to_string(),
            thumbnail: json_str(value, "thumbnail").unwrap_or_default().to_string(),
            duration_seconds: json_int(value, "duration").max(0) as u64,
            formats,
            lyrics: Vec::new(),
        })
    }
}

impl Douyin {
    async fn resolve_media_url(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        index: usize,
    ) -> Result<Option<String>, ResolveError> {
        let media_id = BASE64.encode(index.to_string());
        let relay = format!("{}{RELAY_PATH}", cx.endpoints.api);
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session.client().get(&relay).query(&[
                ("source", "douyin"),
                ("media", &media_id),
                ("bandwidth_saving", "1"),
            ])
        })
        .await?;

        let landed = response.url().to_string();
        let body = response.text().await.map_err(http::map_reqwest_error)?;
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if let Some(url) = json_str(&value, "url") {
                return Ok(Some(url.to_string()));
            }
        }
        // The relay sometimes answers with a redirect instead of JSON; the
        // landing URL is then the download URL itself.
        if !landed.starts_with(&relay) {
            return Ok(Some(landed));
        }
        Ok(None)
    }
}

fn page_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let token_input = Selector::parse("input#token").expect("static selector");
    if let Some(value) = document
        .select(&token_input)
        .find_map(|input| input.value().attr("value"))
    {
        return Some(value.to_string());
    }

    let scripts = Selector::parse("script").expect("static selector");
    for script in document.select(&scripts) {
        let body = script.text().collect::<String>();
        if !body.contains("token") {
            continue;
        }
        for pattern in [&*SCRIPT_TOKEN_DOUBLE, &*SCRIPT_TOKEN_SINGLE] {
            if let Some(captures) = pattern.captures(&body) {
                return Some(captures[1].to_string());
            }
        }
    }
    None
}

/// The helper's request hash: base64 of the URL, the URL length offset by
/// 1000, then base64 of a fixed salt, concatenated.
fn request_hash(url: &str) -> String {
    format!(
        "{}{}{}",
        BASE64.encode(url),
        url.len() + 1000,
        BASE64.encode(HASH_SALT)
    )
}
