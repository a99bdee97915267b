use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pretty_assertions::assert_eq;

use snaplink_core::ErrorKind;
use snaplink_engine::{derive_signing_token, extract_cipher_blob, parse_cipher_config};

/// Assemble the helper page the way the upstream publishes it: a
/// self-evaluating base64 script whose decoded body assigns the cipher
/// object with single-quoted members.
fn cipher_page(object_literal: &str) -> String {
    let script = format!("var gC = {object_literal};");
    format!(
        "<html><head><script>eval(atob('{}'));</script></head><body></body></html>",
        BASE64.encode(script)
    )
}

fn object_literal(sequence_plain: &str, alphabet: &str, ident: &str, f: [&str; 6]) -> String {
    format!(
        "{{'0': '{}', '1': '{alphabet}', '2': '{ident}', 'f': ['{}', '{}', '{}', '{}', '{}', '{}']}}",
        BASE64.encode(sequence_plain),
        f[0],
        f[1],
        f[2],
        f[3],
        f[4],
        f[5],
    )
}

#[test]
fn derives_token_from_plain_configuration() {
    // alphabet indexes for "media" are 12/4/3/8/0; each token is offset +3.
    let page = cipher_page(&object_literal(
        "15-7-6-11-3",
        "abcdefghijklmnopqrstuvwxyz",
        "v2",
        ["0", "0", "3", "0", "-", "K"],
    ));

    let blob = extract_cipher_blob(&page).unwrap();
    let config = parse_cipher_config(&blob).unwrap();
    let key = derive_signing_token(&config).unwrap();
    assert_eq!(key.as_str(), "v2-Kmedia");
    assert_eq!(key.query_value(), BASE64.encode("v2-Kmedia"));
}

#[test]
fn derivation_is_deterministic() {
    let page = cipher_page(&object_literal(
        "15-7-6-11-3",
        "abcdefghijklmnopqrstuvwxyz",
        "v2",
        ["0", "0", "3", "0", "-", "K"],
    ));
    let config = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap();

    let first = derive_signing_token(&config).unwrap();
    let second = derive_signing_token(&config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn applies_reversal_case_transform_and_truncation() {
    // Reversed alphabet is "jihgfedcba"; tokens 5/10/7/6 offset by 1 give
    // indexes 4/9/6/5 = "fade", uppercased then truncated to 3 chars.
    let page = cipher_page(&object_literal(
        "5.10.7.6",
        "abcdefghij",
        "x9",
        ["2", "3", "1", "1", ".", "Q"],
    ));
    let config = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap();

    let key = derive_signing_token(&config).unwrap();
    assert_eq!(key.as_str(), "x9-QFAD");
}

#[test]
fn skips_non_numeric_sequence_fragments() {
    let page = cipher_page(&object_literal(
        "15-x-7-6--11-3",
        "abcdefghijklmnopqrstuvwxyz",
        "v2",
        ["0", "0", "3", "0", "-", "K"],
    ));
    let config = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap();

    let key = derive_signing_token(&config).unwrap();
    assert_eq!(key.as_str(), "v2-Kmedia");
}

#[test]
fn out_of_range_indexes_are_dropped() {
    // 2 - 3 is negative and 99 - 3 is past the alphabet; both vanish.
    let page = cipher_page(&object_literal(
        "2-15-99",
        "abcdefghijklmnopqrstuvwxyz",
        "v2",
        ["0", "0", "3", "0", "-", "K"],
    ));
    let config = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap();

    let key = derive_signing_token(&config).unwrap();
    assert_eq!(key.as_str(), "v2-Km");
}

#[test]
fn missing_required_key_fails_derivation() {
    // No "f" parameter list at all.
    let literal = format!(
        "{{'0': '{}', '1': 'abc', '2': 'v2'}}",
        BASE64.encode("1-2-3")
    );
    let page = cipher_page(&literal);

    let blob = extract_cipher_blob(&page).unwrap();
    let err = parse_cipher_config(&blob).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SignatureDerivation);
}

#[test]
fn short_parameter_list_fails_derivation() {
    let literal = format!(
        "{{'0': '{}', '1': 'abc', '2': 'v2', 'f': ['0', '0', '3']}}",
        BASE64.encode("1-2-3")
    );
    let page = cipher_page(&literal);

    let err = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SignatureDerivation);
}

#[test]
fn non_numeric_control_parameter_fails_derivation() {
    let page = cipher_page(&object_literal(
        "15-7-6-11-3",
        "abcdefghijklmnopqrstuvwxyz",
        "v2",
        ["zero", "0", "3", "0", "-", "K"],
    ));
    let config = parse_cipher_config(&extract_cipher_blob(&page).unwrap()).unwrap();

    let err = derive_signing_token(&config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SignatureDerivation);
}

#[test]
fn page_without_cipher_script_reports_upstream_shape() {
    let err = extract_cipher_blob("<html><body>maintenance</body></html>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
}

#[test]
fn undecodable_blob_fails_derivation() {
    let err = parse_cipher_config("!!!not-base64!!!").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SignatureDerivation);
}
