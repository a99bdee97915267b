//! Catch-all resolution through a JSON extraction API. The only protocol
//! step is a single signed POST; the response is final.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use snaplink_core::{format_note, FormatVariant, MediaData, ProviderId, ResolveError, SourceUrl};

use crate::http::{self, expect_success, now_millis, send_with_retry};
use crate::normalize::{json_int, json_str};
use crate::providers::{ProviderStrategy, RawPayload};
use crate::resolver::ResolveContext;
use crate::session::SessionContext;

const EXTRACT_PATH: &str = "/api-extract/";
/// Fixed trailer the upstream expects appended to the derived key.
const KEY_SUFFIX: &str = "+hesm+ihsesnfec+ue";

pub(crate) struct EasyLink;

#[async_trait]
impl ProviderStrategy for EasyLink {
    fn id(&self) -> ProviderId {
        ProviderId::EasyLink
    }

    async fn orchestrate(
        &self,
        cx: &ResolveContext<'_>,
        session: &SessionContext,
        source: &SourceUrl,
    ) -> Result<RawPayload, ResolveError> {
        let host = source.url.host_str().unwrap_or_default();
        let payload = json!({
            "video_url": source.as_str(),
            "pagination": false,
            "key": request_key(&now_millis(), host),
        });

        let response = send_with_retry(cx.settings, cx.cancel, || {
            session
                .client()
                .post(format!("{}{EXTRACT_PATH}", cx.endpoints.api))
                .json(&payload)
        })
        .await?;
        let value: Value = expect_success(response)?
            .json()
            .await
            .map_err(|err| ResolveError::parse(format!("response was not JSON: {err}")))?;
        Ok(RawPayload::Json(value))
    }

    fn normalize(&self, payload: &RawPayload) -> Result<MediaData, ResolveError> {
        let value = payload.as_json()?;
        match value.get("err").and_then(Value::as_i64) {
            Some(1) => Err(ResolveError::conversion(
                json_str(value, "msg").unwrap_or("unknown upstream error"),
            )),
            Some(0) => {
                let videos = value
                    .get("final_urls")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ResolveError::parse("no final_urls in response"))?;

                let mut data = MediaData::default();
                let mut formats = Vec::new();
                for (index, video) in videos.iter().enumerate() {
                    if index == 0 {
                        data.title = json_str(video, "title").unwrap_or_default().to_string();
                        data.thumbnail = json_str(video, "thumb").unwrap_or_default().to_string();
                    }
                    let Some(links) = video.get("links").and_then(Value::as_array) else {
                        continue;
                    };
                    for link in links {
                        let Some(download_url) = json_str(link, "link_url") else {
                            continue;
                        };
                        let container = json_str(link, "file_type").unwrap_or_default().to_string();
                        let quality = json_str(link, "file_quality").unwrap_or_default();
                        let units = json_str(link, "file_quality_units").unwrap_or_default();
                        let quality_label = format!("{quality} {units}").trim().to_string();
                        let audio_only = matches!(container.as_str(), "mp3" | "m4a" | "wav");
                        let size = json_int(link, "file_size");
                        formats.push(FormatVariant {
                            note: format_note(!audio_only, true, &quality_label),
                            quality: quality_label,
                            container,
                            size_bytes: (size > 0).then_some(size as u64),
                            download_url: download_url.to_string(),
                            has_video: !audio_only,
                            has_audio: true,
                        });
                    }
                }

                if formats.is_empty() {
                    return Err(ResolveError::parse("no downloadable formats in response"));
                }
                data.formats = formats;
                Ok(data)
            }
            _ => Err(ResolveError::parse("unknown response format")),
        }
    }
}

/// Request key: base64 of `"{ts}+{host}"`, digested, with the upstream's
/// fixed trailer.
fn request_key(timestamp: &str, host: &str) -> String {
    let encoded = BASE64.encode(format!("{timestamp}+{host}"));
    let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
    format!("{digest}{KEY_SUFFIX}")
}
