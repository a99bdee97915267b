//! Shared helpers for turning idiosyncratic upstream payloads into the
//! canonical result shape.

use serde_json::Value;

use snaplink_core::ResolveError;

/// Extract the JSON object a page embeds after a marker token, e.g.
/// `window._ROUTER_DATA = {...};`. The object is located by finding the
/// first `{` after the marker and balancing braces from there, with string
/// literals and escapes respected, so trailing script text does not confuse
/// the boundary.
pub fn embedded_json(html: &str, marker: &str) -> Result<Value, ResolveError> {
    let marker_at = html
        .find(marker)
        .ok_or_else(|| ResolveError::parse(format!("marker {marker:?} not found in page")))?;
    let after = &html[marker_at + marker.len()..];
    let open = after
        .find('{')
        .ok_or_else(|| ResolveError::parse(format!("no JSON object after marker {marker:?}")))?;
    let candidate = &after[open..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (at, ch) in candidate.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let body = &candidate[..at + ch.len_utf8()];
                    return serde_json::from_str(body).map_err(|err| {
                        ResolveError::parse(format!("embedded JSON failed to parse: {err}"))
                    });
                }
            }
            _ => {}
        }
    }
    Err(ResolveError::parse(format!(
        "unterminated JSON object after marker {marker:?}"
    )))
}

/// Some upstreams double-escape ampersands in otherwise-JSON bodies.
pub fn unescape_ampersands(text: &str) -> String {
    text.replace("\\u0026", "&")
}

/// Redirect URLs arrive with stray backslash escaping; strip it.
pub(crate) fn clean_redirect_url(url: &str) -> String {
    url.replace('\\', "")
}

/// Numeric field that upstreams serve interchangeably as a number or a
/// numeric string; anything else counts as zero.
pub(crate) fn json_int(value: &Value, key: &str) -> i64 {
    match value.get(key) {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

pub(crate) fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Parse a `mm:ss` label into seconds; unparseable labels count as zero.
pub(crate) fn parse_clock_duration(text: &str) -> u64 {
    let mut parts = text.trim().splitn(2, ':');
    match (
        parts.next().and_then(|m| m.parse::<u64>().ok()),
        parts.next().and_then(|s| s.parse::<u64>().ok()),
    ) {
        (Some(minutes), Some(seconds)) => minutes * 60 + seconds,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_json_balances_braces_inside_strings() {
        let html = r#"<script>window._ROUTER_DATA = {"a": "brace } in string", "b": {"c": 1}};</script>"#;
        let value = embedded_json(html, "window._ROUTER_DATA").unwrap();
        assert_eq!(value["b"]["c"], 1);
    }

    #[test]
    fn embedded_json_requires_the_marker() {
        let err = embedded_json("<html></html>", "window._ROUTER_DATA").unwrap_err();
        assert_eq!(err.kind, snaplink_core::ErrorKind::Parse);
    }

    #[test]
    fn embedded_json_rejects_unterminated_objects() {
        let err = embedded_json("data = {\"a\": 1", "data").unwrap_err();
        assert_eq!(err.kind, snaplink_core::ErrorKind::Parse);
    }

    #[test]
    fn clock_duration_parses_minutes_and_seconds() {
        assert_eq!(parse_clock_duration("3:25"), 205);
        assert_eq!(parse_clock_duration(" 0:07 "), 7);
        assert_eq!(parse_clock_duration("not a clock"), 0);
    }
}
