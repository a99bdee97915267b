use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Browser UA presented to every upstream unless a spec overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    YouTube,
    Twitter,
    TikTok,
    Douyin,
    Qishui,
    Spotify,
    EasyLink,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::YouTube => "youtube",
            ProviderId::Twitter => "twitter",
            ProviderId::TikTok => "tiktok",
            ProviderId::Douyin => "douyin",
            ProviderId::Qishui => "qishui",
            ProviderId::Spotify => "spotify",
            ProviderId::EasyLink => "easylink",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(ProviderId::YouTube),
            "twitter" | "x" => Ok(ProviderId::Twitter),
            "tiktok" => Ok(ProviderId::TikTok),
            "douyin" => Ok(ProviderId::Douyin),
            "qishui" => Ok(ProviderId::Qishui),
            "spotify" => Ok(ProviderId::Spotify),
            "easylink" | "easy" => Ok(ProviderId::EasyLink),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// How a provider's upstream protocol is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolShape {
    /// One request; the response is final.
    Direct,
    /// Init endpoint, convert endpoint with optional redirect chain, then a
    /// bounded poll loop against a progress URL.
    InitConvertPoll,
    /// One or more page-shaped GET/POST calls parsed out of HTML.
    Scrape,
}

/// Static description of one upstream helper site. Immutable; built once at
/// startup and shared process-wide.
#[derive(Debug)]
pub struct ProviderSpec {
    pub id: ProviderId,
    /// Bootstrap/page host, e.g. the helper homepage.
    pub base_url: &'static str,
    /// API host when it differs from the page host.
    pub api_url: Option<&'static str>,
    pub shape: ProtocolShape,
    /// Ordered URL patterns; first pattern with a match wins.
    pub patterns: Vec<Regex>,
    /// Whether a matched source URL keeps its query string.
    pub keep_query: bool,
    pub origin: Option<&'static str>,
    pub referer: Option<&'static str>,
    /// Provider quirks sent on every request (e.g. HTMX markers).
    pub extra_headers: &'static [(&'static str, &'static str)],
}

impl ProviderSpec {
    pub fn api_url(&self) -> &'static str {
        self.api_url.unwrap_or(self.base_url)
    }
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("provider pattern must compile")
}

static REGISTRY: LazyLock<Vec<ProviderSpec>> = LazyLock::new(|| {
    vec![
        ProviderSpec {
            id: ProviderId::YouTube,
            base_url: "https://ytmp3.la",
            api_url: Some("https://d.ummn.nu"),
            shape: ProtocolShape::InitConvertPoll,
            patterns: vec![
                pattern(r"https?://youtu\.be/[A-Za-z0-9_-]{11}\S*"),
                pattern(r"https?://(?:www\.)?youtube\.com/shorts/[A-Za-z0-9_-]{11}\S*"),
                pattern(r"https?://(?:www\.|m\.)?youtube\.com/watch\?\S*v=[A-Za-z0-9_-]{11}\S*"),
            ],
            keep_query: true,
            origin: Some("https://ytmp3.la"),
            referer: Some("https://ytmp3.la/"),
            extra_headers: &[
                ("Sec-Fetch-Dest", "empty"),
                ("Sec-Fetch-Mode", "cors"),
                ("Sec-Fetch-Site", "cross-site"),
            ],
        },
        ProviderSpec {
            id: ProviderId::Twitter,
            base_url: "https://ssstwitter.com",
            api_url: None,
            shape: ProtocolShape::Scrape,
            patterns: vec![pattern(r"https?://(?:www\.)?(?:twitter\.com|x\.com)/\S+")],
            keep_query: true,
            origin: Some("https://ssstwitter.com"),
            referer: Some("https://ssstwitter.com/"),
            extra_headers: &[
                ("hx-current-url", "https://ssstwitter.com/"),
                ("hx-request", "true"),
                ("hx-target", "target"),
            ],
        },
        ProviderSpec {
            id: ProviderId::TikTok,
            base_url: "https://tiktokio.com",
            api_url: None,
            shape: ProtocolShape::Scrape,
            patterns: vec![pattern(r"https?://(?:www\.|vm\.|vt\.)?tiktok\.com/\S+")],
            keep_query: true,
            origin: Some("https://tiktokio.com"),
            referer: Some("https://tiktokio.com/"),
            extra_headers: &[],
        },
        // Qishui shares the douyin.com domain; it must sit ahead of the
        // broader douyin patterns in the scan order.
        ProviderSpec {
            id: ProviderId::Qishui,
            base_url: "https://music.douyin.com",
            // Share links live on their own host; requests against them are
            // rebased onto this endpoint.
            api_url: Some("https://qishui.douyin.com"),
            shape: ProtocolShape::Scrape,
            patterns: vec![pattern(r"https?://qishui\.douyin\.com/\S+")],
            keep_query: true,
            origin: None,
            referer: None,
            extra_headers: &[],
        },
        ProviderSpec {
            id: ProviderId::Douyin,
            base_url: "https://snapdouyin.app",
            api_url: None,
            shape: ProtocolShape::Scrape,
            patterns: vec![
                pattern(r"https?://(?:v\.douyin\.com|www\.douyin\.com|douyin\.com)/[^\s]+"),
                pattern(r"https?://(?:www\.iesdouyin\.com)/[^\s]+"),
                pattern(r"https?://[^\s]*douyin[^\s]*"),
            ],
            keep_query: true,
            origin: Some("https://snapdouyin.app"),
            referer: Some("https://snapdouyin.app/"),
            extra_headers: &[],
        },
        ProviderSpec {
            id: ProviderId::Spotify,
            base_url: "https://spotifymate.com",
            api_url: None,
            shape: ProtocolShape::Scrape,
            patterns: vec![pattern(r"https?://(?:[A-Za-z0-9-]+\.)?spotify\.com/[^\s]+")],
            keep_query: false,
            origin: Some("https://spotifymate.com"),
            referer: Some("https://spotifymate.com/en"),
            extra_headers: &[],
        },
        // Catch-all aggregator; must stay last in the scan order.
        ProviderSpec {
            id: ProviderId::EasyLink,
            base_url: "https://api.easydownloader.app",
            api_url: None,
            shape: ProtocolShape::Direct,
            patterns: vec![pattern(r#"https?://[^\s<>"]+"#)],
            keep_query: true,
            origin: Some("https://easydownloader.app"),
            referer: Some("https://easydownloader.app/"),
            extra_headers: &[],
        },
    ]
});

/// All provider specs in scan order.
pub fn registry() -> &'static [ProviderSpec] {
    &REGISTRY
}

pub fn spec_for(id: ProviderId) -> &'static ProviderSpec {
    registry()
        .iter()
        .find(|spec| spec.id == id)
        .expect("every ProviderId has a registry entry")
}
