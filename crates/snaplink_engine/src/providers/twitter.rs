//! Twitter/X resolution through an HTMX-fronted helper site: one cookie
//! bootstrap GET, one form POST, CDN anchors scraped out of the fragment.

use async_trait::async_trait;
use scraper::{Html, Selector};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, send_with_retry};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

const CDN_PREFIX: &str = "https://ssscdn.io";

pub(crate) struct Twitter;

#[async_trait]
impl ProviderStrategy for Twitter {
    fn id(&self) -> ProviderId {
        ProviderId::Twitter
    }

    async fn bootstrap(&self, cx: &ResolveContext<'_>) -> Result<SessionContext, ResolveError> {
        let client = http::session_client(self.spec(), cx.settings)?;
        // The POST is rejected without the cookies this GET sets.
        let response = send_with_retry(cx.settings, cx.cancel, || {
            client.get(format!("{}/", cx.endpoints.page))
        })
        .await?;
        expect_success(response)?;
        Ok(SessionContext::new(client, Default::default(), None))
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let current_url = format!("{}/", cx.endpoints.page);
        let form = [
            ("id", source.as_str()),
            ("hx-target", "target"),
            ("hx-current-url", current_url.as_str()),
        ];
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session
                .client()
                .post(format!("{}/", cx.endpoints.page))
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

        // Quality buckets keyed off the anchor text; a later anchor for the
        // same bucket replaces the URL but keeps the slot's position.
        let mut formats: Vec<FormatVariant> = Vec::new();
        for anchor in document.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.starts_with(CDN_PREFIX) {
                continue;
            }
            let label = anchor.text().collect::<String>();
            let quality = if label.contains("HD") {
                "HD"
            } else if label.contains("640x360") {
                "medium"
            } else if label.contains("480x270") {
                "low"
            } else {
                continue;
            };

            if let Some(existing) = formats.iter_mut().find(|f| f.quality == quality) {
                existing.download_url = href.to_string();
            } else {
                formats.push(FormatVariant {
                    quality: quality.to_string(),
                    container: "mp4".to_string(),
                    size_bytes: None,
                    download_url: href.to_string(),
                    has_video: true,
                    has_audio: true,
                    note: format_note(true, true, quality),
                });
            }
        }

        if formats.is_empty() {
            return Err(ResolveError::parse("no video links found"));
        }
        Ok(MediaData {
            formats,
            ..MediaData::default()
        })
    }
}
