//! TikTok resolution: share links unshortened first, then the helper's HTMX
//! endpoint is driven with the prefix and config values scraped at
//! bootstrap, and the result fragment is read back out of the DOM.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, now_millis, send_with_retry};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

/// Hosts whose links are redirect stubs that must be followed before a video
/// id can be read off the final URL.
const SHORT_LINK_HOSTS: &[&str] = &["vm.tiktok.com", "vt.tiktok.com", "v.douyin.com"];

const DOWNLOAD_PREFIX: &str = "https://dl.tiktokio.com/download";

static CONFIG_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"config\s*=\s*(\{[^}]+\})").unwrap());

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"/video/(\d+)", r"item_ids=(\d+)", r"/(\d{15,21})"]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

pub(crate) struct TikTok;

#[async_trait]
impl ProviderStrategy for TikTok {
    fn id(&self) -> ProviderId {
        ProviderId::TikTok
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

        let mut tokens = HashMap::new();
        let document = Html::parse_document(&html);
        let prefix_input = Selector::parse(r#"input[name="prefix"]"#).expect("static selector");
        let prefix = document
            .select(&prefix_input)
            .find_map(|input| input.value().attr("value"))
            .ok_or_else(|| ResolveError::upstream("prefix marker missing from helper page"))?;
        tokens.insert("prefix".to_string(), prefix.to_string());

        // Some deployments also publish extra token fields in an inline
        // script; whatever they name is posted back verbatim.
        let scripts = Selector::parse("script").expect("static selector");
        for script in document.select(&scripts) {
            let body = script.text().collect::<String>();
            if !body.contains("getNewUrl") {
                continue;
            }
            if let Some(captures) = CONFIG_OBJECT.captures(&body) {
                if let Ok(Value::Object(config)) = serde_json::from_str::<Value>(&captures[1]) {
                    for (key, value) in config {
                        tokens.insert(key, form_value(&value));
                    }
                }
            }
        }

        Ok(SessionContext::new(client, tokens, None))
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let final_url = self.unshorten(cx, session, source).await?;
        let video_id = video_id_from(&final_url)?;

        let mut form: Vec<(String, String)> = vec![
            (
                "vid".to_string(),
                format!("https://www.douyin.com/video/{video_id}"),
            ),
            (
                "prefix".to_string(),
                session.token("prefix").unwrap_or_default().to_string(),
            ),
        ];
        for (key, value) in session.tokens() {
            if key != "prefix" {
                form.push((key.clone(), value.clone()));
            }
        }

        let endpoint = format!("{}/api/v1/tk-htmx", cx.endpoints.api);
        let current_url = format!("{}/", cx.endpoints.page);
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session
                .client()
                .post(&endpoint)
                .query(&[("t", now_millis()), ("r", random_marker())])
                .header("X-Requested-With", "XMLHttpRequest")
                .header("HX-Request", "true")
                .header("HX-Current-URL", &current_url)
                .header("HX-Target", "tiktok-parse-result")
                .form(&form)
        })
        .await?;
        let html = expect_success(response)?
            .text()
            .await
            .map_err(http::map_reqwest_error)?;
        Ok(RawPayload::Html(html))
    }

    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError> {
        let document = Html::parse_document(payload.as_html()?);
        let title_sel = Selector::parse("#tk-search-h2").expect("static selector");
        let cover_sel = Selector::parse(r#"img[src*="webp"]"#).expect("static selector");
        let link_sel = Selector::parse(".tk-down-link a").expect("static selector");

        let title = document
            .select(&title_sel)
            .next()
            .map(|node| node.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let thumbnail = document
            .select(&cover_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let mut no_watermark = None;
        let mut no_watermark_hd = None;
        let mut watermark = None;
        let mut audio = None;
        for anchor in document.select(&link_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.starts_with(DOWNLOAD_PREFIX) {
                continue;
            }
            let label = anchor.text().collect::<String>().to_lowercase();
            if label.contains("without watermark (hd)") {
                no_watermark_hd = Some(href.to_string());
            } else if label.contains("without watermark") {
                no_watermark = Some(href.to_string());
            } else if label.contains("watermark") {
                watermark = Some(href.to_string());
            } else if label.contains("mp3") {
                audio = Some(href.to_string());
            }
        }

        let mut formats = Vec::new();
        for (quality, url, has_video) in [
            ("No Watermark", no_watermark, true),
            ("No Watermark (HD)", no_watermark_hd, true),
            ("Watermark", watermark, true),
            ("mp3", audio, false),
        ] {
            if let Some(download_url) = url {
                formats.push(FormatVariant {
                    quality: quality.to_string(),
                    container: if has_video { "mp4" } else { "mp3" }.to_string(),
                    size_bytes: None,
                    download_url,
                    has_video,
                    has_audio: true,
                    note: format_note(has_video, true, quality),
                });
            }
        }

        if formats.is_empty() {
            return Err(ResolveError::parse("no download links found"));
        }
        Ok(MediaData {
            title,
            thumbnail,
            formats,
            ..MediaData::default()
        })
    }
}

impl TikTok {
    /// Follow a share-link stub to its destination so the id patterns can
    /// see the real video URL. Plain links pass through untouched.
    async fn unshorten(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<String, ResolveError> {
        let host = source.url.host_str().unwrap_or_default();
        if !SHORT_LINK_HOSTS.contains(&host) {
            return Ok(source.as_str().to_string());
        }
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session.client().get(source.as_str())
        })
        .await?;
        let response = expect_success(response)?;
        Ok(response.url().to_string())
    }
}

fn video_id_from(url: &str) -> Result<String, ResolveError> {
    for pattern in VIDEO_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            return Ok(captures[1].to_string());
        }
    }
    Err(ResolveError::input(format!("no video id in URL {url}")))
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn random_marker() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}
