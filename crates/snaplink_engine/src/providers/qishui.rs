//! Qishui (Douyin music) resolution: the share link redirects to a track
//! page whose audio URL hides in router data embedded in a script block;
//! title, artist, cover and lyrics come straight off the DOM.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, send_with_retry};
use crate::normalize::{embedded_json, parse_clock_duration};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

const ROUTER_DATA_MARKER: &str = "window._ROUTER_DATA";
/// Inline style the track page uses for its duration label.
const DURATION_STYLE: &str = "color:rgba(255, 255, 255, 0.5)";
/// Lyric block footer credited to contributors; not a lyric line.
const CONTRIBUTOR_FOOTER: &str = "滚动歌词&翻译贡献者";

static TRACK_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"track_id=(\d+)").unwrap());

pub(crate) struct Qishui;

#[async_trait]
impl ProviderStrategy for Qishui {
    fn id(&self) -> ProviderId {
        ProviderId::Qishui
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let track_id = self.track_id(cx, source).await?;
        let track_url = format!(
            "{}/qishui/share/track?track_id={track_id}",
            cx.endpoints.page
        );
        let response = send_with_retry(cx.settings, cx.cancel, || {
            session.client().get(&track_url)
        })
        .await?;
        let html = expect_success(response)?
            .text()
            .await
            .map_err(http::map_reqwest_error)?;
        Ok(RawPayload::Html(html))
    }

    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError> {
        let html = payload.as_html()?;
        let router_data = embedded_json(html, ROUTER_DATA_MARKER)?;
        let audio_url = router_data
            .pointer("/loaderData/track_page/audioWithLyricsOption/url")
            .and_then(|value| value.as_str())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolveError::parse("no audio link in track page"))?
            .to_string();

        let document = Html::parse_document(html);
        let title = select_text(&document, "h1.title");
        let author = select_text(&document, "span.artist-name-max");
        let cover_sel = Selector::parse(r#"img[alt="a-image"]"#).expect("static selector");
        let thumbnail = document
            .select(&cover_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let lyric_sel = Selector::parse("div.ssr-lyric").expect("static selector");
        let lyrics = document
            .select(&lyric_sel)
            .map(|node| node.text().collect::<String>().trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with(CONTRIBUTOR_FOOTER))
            .collect();

        let styled = Selector::parse("div[style]").expect("static selector");
        let duration_seconds = document
            .select(&styled)
            .find(|node| {
                node.value()
                    .attr("style")
                    .is_some_and(|style| style.contains(DURATION_STYLE))
            })
            .map(|node| parse_clock_duration(&node.text().collect::<String>()))
            .unwrap_or(0);

        Ok(MediaData {
            title,
            author,
            thumbnail,
            duration_seconds,
            formats: vec![FormatVariant {
                quality: "default".to_string(),
                container: "m4a".to_string(),
                size_bytes: None,
                download_url: audio_url,
                has_video: false,
                has_audio: true,
                note: format_note(false, true, "default"),
            }],
            lyrics,
        })
    }
}

impl Qishui {
    /// A share link answers with a redirect whose `Location` carries the
    /// track id; stale links fall back to the zlink lookup page.
    async fn track_id(
        &self,
        cx: &ResolveContext<'_>,
        source: &SourceUrl,
    ) -> Result<String, ResolveError> {
        let bare = http::no_redirect_client(self.spec(), cx.settings)?;
        // Share links sit on the dedicated share host (the spec's API
        // endpoint); rebase the link path onto it.
        let share_url = match source.url.query() {
            Some(query) => format!("{}{}?{query}", cx.endpoints.api, source.url.path()),
            None => format!("{}{}", cx.endpoints.api, source.url.path()),
        };
        let response = send_with_retry(cx.settings, cx.cancel, || bare.get(&share_url)).await?;

        if response.status().is_redirection() {
            if let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                if let Some(captures) = TRACK_ID.captures(location) {
                    return Ok(captures[1].to_string());
                }
            }
        }

        let zlink_id = source
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        let lookup = format!(
            "{}/qishui/share/track?zlink_id={zlink_id}",
            cx.endpoints.page
        );
        let client = http::session_client(self.spec(), cx.settings)?;
        let response = send_with_retry(cx.settings, cx.cancel, || client.get(&lookup)).await?;
        let html = expect_success(response)?
            .text()
            .await
            .map_err(http::map_reqwest_error)?;
        TRACK_ID
            .captures(&html)
            .map(|captures| captures[1].to_string())
            .ok_or_else(|| ResolveError::parse("track id not found for share link"))
    }
}

fn select_text(document: &Html, selector: &str) -> String {
    let selector = Selector::parse(selector).expect("static selector");
    document
        .select(&selector)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}
