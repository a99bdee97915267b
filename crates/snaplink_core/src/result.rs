use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Marker some upstreams put in a quality label to flag their best rendition.
pub const BEST_QUALITY_MARKER: char = '⭐';

/// One downloadable rendition of the resolved media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVariant {
    pub quality: String,
    pub container: String,
    pub size_bytes: Option<u64>,
    pub download_url: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub note: String,
}

/// Canonical metadata every provider is normalized into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaData {
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    pub duration_seconds: u64,
    /// Ordered as reported by the upstream; never reordered afterwards.
    pub formats: Vec<FormatVariant>,
    /// Lyric lines, for audio providers that publish them.
    pub lyrics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStatus {
    Success,
    Error,
}

/// The one result shape handed back to the calling layer. A resolution never
/// surfaces an exception for input or upstream-classified failures; it comes
/// back as `status == Error` with a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaResult {
    pub status: ResolveStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MediaData>,
}

impl MediaResult {
    /// Success result. `data.formats` must be non-empty; normalizers reject
    /// empty format lists before getting here.
    pub fn success(message: impl Into<String>, data: MediaData) -> Self {
        debug_assert!(!data.formats.is_empty());
        Self {
            status: ResolveStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(error: &ResolveError) -> Self {
        Self {
            status: ResolveStatus::Error,
            message: error.to_string(),
            data: None,
        }
    }
}

/// Descriptive label for a format: capability names in a fixed order, then a
/// best-quality tag when the upstream label carries the superlative marker.
pub fn format_note(has_video: bool, has_audio: bool, quality: &str) -> String {
    let mut notes = Vec::new();
    if has_video {
        notes.push("Video");
    }
    if has_audio {
        notes.push("Audio");
    }
    if quality.contains(BEST_QUALITY_MARKER) {
        notes.push("Best Quality");
    }
    notes.join(" + ")
}
