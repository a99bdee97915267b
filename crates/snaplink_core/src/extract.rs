use url::Url;

use crate::error::ResolveError;
use crate::provider::{registry, ProviderId, ProviderSpec};

/// A validated, normalized source URL plus the provider it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    pub url: Url,
    pub provider: ProviderId,
}

impl SourceUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Find the first provider URL in free-form text, scanning the registry in
/// order: first provider whose pattern list matches wins, first pattern with
/// a match wins, first match in scan order within that pattern wins.
pub fn extract_source(text: &str) -> Result<SourceUrl, ResolveError> {
    for spec in registry() {
        if let Some(found) = try_extract(text, spec)? {
            return Ok(found);
        }
    }
    Err(ResolveError::input("no recognizable media URL found in text"))
}

/// Extract against a single provider's pattern list.
pub fn extract_for(text: &str, spec: &ProviderSpec) -> Result<SourceUrl, ResolveError> {
    match try_extract(text, spec)? {
        Some(found) => Ok(found),
        None => Err(ResolveError::input(format!(
            "no {} URL found in text",
            spec.id
        ))),
    }
}

fn try_extract(text: &str, spec: &ProviderSpec) -> Result<Option<SourceUrl>, ResolveError> {
    for pattern in &spec.patterns {
        if let Some(found) = pattern.find(text) {
            let url = normalize(found.as_str(), spec)?;
            return Ok(Some(SourceUrl {
                url,
                provider: spec.id,
            }));
        }
    }
    Ok(None)
}

fn normalize(raw: &str, spec: &ProviderSpec) -> Result<Url, ResolveError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|err| ResolveError::input(format!("matched URL failed to parse: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ResolveError::input(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }
    if !spec.keep_query {
        url.set_query(None);
    }
    url.set_fragment(None);
    Ok(url)
}
