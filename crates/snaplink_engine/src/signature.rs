//! Derivation of the request-signing token some helper sites hide behind an
//! obfuscated, periodically rotated configuration.
//!
//! The upstream homepage embeds `<script>eval(atob('...'));</script>`; the
//! decoded snippet assigns a small object whose keys drive a substitution
//! cipher. The shape is validated in full before anything is derived: a
//! partially matched configuration means the upstream changed and must never
//! be silently misinterpreted.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use serde_json::Value;

use snaplink_core::ResolveError;

static CIPHER_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<script>eval\(atob\('(.*?)'\)\);</script>").unwrap());

/// Derived signing token. Valid only for the session context it came from;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wire form: upstreams expect the token base64-encoded in the `k`
    /// query parameter.
    pub fn query_value(&self) -> String {
        BASE64.encode(&self.0)
    }
}

/// The decoded cipher configuration.
///
/// Field mapping from the upstream object: `"0"` is a base64 numeric
/// sequence, `"1"` the (optionally reversed) alphabet, `"2"` an identifier
/// segment prefixed to the final token, and `"f"` a parameter list of at
/// least six entries: case flag, truncation length, index offset, reversal
/// flag, separator, key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherConfig {
    sequence: String,
    alphabet: String,
    ident: String,
    params: Vec<String>,
}

/// Pull the base64 cipher payload out of a bootstrapped helper page.
pub fn extract_cipher_blob(html: &str) -> Result<String, ResolveError> {
    CIPHER_SCRIPT
        .captures(html)
        .map(|captures| captures[1].to_string())
        .ok_or_else(|| ResolveError::upstream("cipher configuration script not found in page"))
}

/// Decode the embedded payload and validate the configuration shape.
pub fn parse_cipher_config(blob: &str) -> Result<CipherConfig, ResolveError> {
    let decoded = BASE64
        .decode(blob.trim())
        .map_err(|err| ResolveError::signature(format!("cipher blob is not base64: {err}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|err| ResolveError::signature(format!("cipher blob is not utf-8: {err}")))?;

    // The decoded snippet is a script statement; the object literal sits
    // between the outermost braces and uses single quotes.
    let start = decoded
        .find('{')
        .ok_or_else(|| ResolveError::signature("no object literal in cipher blob"))?;
    let end = decoded
        .rfind('}')
        .ok_or_else(|| ResolveError::signature("no object literal in cipher blob"))?;
    if end < start {
        return Err(ResolveError::signature("malformed object literal in cipher blob"));
    }
    let literal = decoded[start..=end].replace('\'', "\"");
    let object: Value = serde_json::from_str(&literal)
        .map_err(|err| ResolveError::signature(format!("cipher object failed to parse: {err}")))?;

    let sequence = required_string(&object, "0")?;
    let alphabet = required_string(&object, "1")?;
    let ident = required_string(&object, "2")?;
    let params = object
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| ResolveError::signature("cipher config is missing key \"f\""))?
        .iter()
        .map(value_as_string)
        .collect::<Result<Vec<_>, _>>()?;
    if params.len() < 6 {
        return Err(ResolveError::signature(format!(
            "cipher parameter list has {} entries, expected at least 6",
            params.len()
        )));
    }

    Ok(CipherConfig {
        sequence,
        alphabet,
        ident,
        params,
    })
}

/// Run the substitution cipher and assemble the signing token.
pub fn derive_signing_token(config: &CipherConfig) -> Result<SigningKey, ResolveError> {
    let sequence = BASE64
        .decode(config.sequence.as_bytes())
        .map_err(|err| ResolveError::signature(format!("cipher sequence is not base64: {err}")))?;
    let sequence = String::from_utf8(sequence)
        .map_err(|err| ResolveError::signature(format!("cipher sequence is not utf-8: {err}")))?;

    let case_flag = numeric_param(config, 0)?;
    let truncate_len = numeric_param(config, 1)?;
    let offset = numeric_param(config, 2)?;
    let reversed = numeric_param(config, 3)? > 0;
    let separator = &config.params[4];
    let prefix = &config.params[5];

    let mut alphabet: Vec<char> = config.alphabet.chars().collect();
    if reversed {
        alphabet.reverse();
    }

    let mut key = String::new();
    for part in sequence.split(separator.as_str()) {
        // Non-numeric fragments are padding; skip them.
        let Ok(position) = part.trim().parse::<i64>() else {
            continue;
        };
        let index = position - offset;
        if index >= 0 && (index as usize) < alphabet.len() {
            key.push(alphabet[index as usize]);
        }
    }

    match case_flag {
        1 => key = key.to_lowercase(),
        2 => key = key.to_uppercase(),
        _ => {}
    }

    let key = if truncate_len > 0 {
        let truncated: String = key.chars().take(truncate_len as usize).collect();
        format!("{prefix}{truncated}")
    } else {
        format!("{prefix}{key}")
    };

    Ok(SigningKey(format!("{}-{}", config.ident, key)))
}

fn required_string(object: &Value, field: &str) -> Result<String, ResolveError> {
    object
        .get(field)
        .map(value_as_string)
        .transpose()?
        .ok_or_else(|| ResolveError::signature(format!("cipher config is missing key {field:?}")))
}

fn value_as_string(value: &Value) -> Result<String, ResolveError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(ResolveError::signature(format!(
            "unexpected cipher config value: {other}"
        ))),
    }
}

fn numeric_param(config: &CipherConfig, index: usize) -> Result<i64, ResolveError> {
    config.params[index].trim().parse::<i64>().map_err(|_| {
        ResolveError::signature(format!(
            "cipher parameter {index} is not numeric: {:?}",
            config.params[index]
        ))
    })
}
