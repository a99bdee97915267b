//! Spotify resolution through a one-page helper: a rotating hidden form
//! field pairs with a URL checksum, and the answer is an anchor pointing at
//! the helper's tokenized download path.

use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, send_with_retry};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

const DOWNLOAD_MARKER: &str = "/dl?token=";

pub(crate) struct Spotify;

#[async_trait]
impl ProviderStrategy for Spotify {
    fn id(&self) -> ProviderId {
        ProviderId::Spotify
    }

    async fn bootstrap(&self, cx: &ResolveContext<'_>) -> Result<SessionContext, ResolveError> {
        let client = http::session_client(self.spec(), cx.settings)?;
        let response = send_with_retry(cx.settings, cx.cancel, || {
            client.get(format!("{}/en", cx.endpoints.page))
        })
        .await?;
        let html = expect_success(response)?
            .text()
            .await
            .map_err(http::map_reqwest_error)?;

        let (name, value) = hidden_token(&html)
            .ok_or_else(|| ResolveError::upstream("hidden token missing from helper page"))?;
        let mut tokens = HashMap::new();
        tokens.insert("token_name".to_string(), name);
        tokens.insert("token_value".to_string(), value);
        Ok(SessionContext::new(client, tokens, None))
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let url = source.as_str();
        let checksum = hex::encode(Sha256::digest(url.as_bytes()));
        let token_name = session.token("token_name").unwrap_or_default().to_string();
        let token_value = session.token("token_value").unwrap_or_default().to_string();
        let form = [
            ("url".to_string(), url.to_string()),
            ("_lvrcs".to_string(), checksum),
            (token_name, token_value),
        ];

        let response = send_with_retry(cx.settings, cx.cancel, || {
            session
                .client()
                .post(format!("{}/action", cx.endpoints.api))
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
        let anchors = Selector::parse("a[href]").expect("static selector");

        for anchor in document.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.contains(DOWNLOAD_MARKER) {
                continue;
            }
            let label = anchor.text().collect::<String>().trim().to_string();
            // The cover-art anchor shares the download path; skip it.
            if label.contains("Cover") {
                continue;
            }
            return Ok(MediaData {
                title: String::new(),
                formats: vec![FormatVariant {
                    quality: label.clone(),
                    container: "mp3".to_string(),
                    size_bytes: None,
                    download_url: absolute(href),
                    has_video: false,
                    has_audio: true,
                    note: format_note(false, true, &label),
                }],
                ..MediaData::default()
            });
        }
        Err(ResolveError::parse("no download links found"))
    }
}

fn hidden_token(html: &str) -> Option<(String, String)> {
    let document = Html::parse_document(html);
    let hidden = Selector::parse(r#"input[type="hidden"]"#).expect("static selector");
    document.select(&hidden).find_map(|input| {
        let element = input.value();
        match (element.attr("name"), element.attr("value")) {
            (Some(name), Some(value)) => Some((name.to_string(), value.to_string())),
            _ => None,
        }
    })
}

fn absolute(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!(
            "{}{}",
            snaplink_core::spec_for(ProviderId::Spotify).base_url,
            href
        )
    }
}
