use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snaplink_core::{ErrorKind, ProviderId, ResolveStatus};
use snaplink_engine::{EngineSettings, Resolver};

const WATCH_TEXT: &str = "listen to https://youtu.be/dQw4w9WgXcQ tonight";

/// The signing token the canned cipher page below derives to.
const EXPECTED_TOKEN: &str = "v2-Kmedia";

fn cipher_page() -> String {
    let literal = format!(
        "{{'0': '{}', '1': 'abcdefghijklmnopqrstuvwxyz', '2': 'v2', 'f': ['0', '0', '3', '0', '-', 'K']}}",
        BASE64.encode("15-7-6-11-3")
    );
    let script = format!("var gC = {literal};");
    format!(
        "<html><head><script>eval(atob('{}'));</script></head></html>",
        BASE64.encode(script)
    )
}

fn settings(server: &MockServer) -> EngineSettings {
    let mut settings = EngineSettings {
        request_timeout: Duration::from_millis(500),
        retry_budget: 1,
        retry_delay: Duration::from_millis(10),
        redirect_hop_limit: 2,
        poll_interval: Duration::from_millis(10),
        poll_max_attempts: 3,
        ..EngineSettings::default()
    };
    settings.override_endpoints(ProviderId::YouTube, server.uri());
    settings
}

async fn mount_homepage(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(cipher_page()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn resolves_through_init_convert_and_poll() {
    let server = MockServer::start().await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .and(query_param("k", BASE64.encode(EXPECTED_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "convertURL": format!("{}/convert", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/convert"))
        .and(query_param("v", "https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
        .and(query_param("f", "mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "redirect": 0,
            "downloadURL": "https://files.example.com/track.mp3",
            "progressURL": format!("{}/progress", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "progress": 3,
            "title": "Test Song",
        })))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let result = resolver.resolve(ProviderId::YouTube, WATCH_TEXT).await;

    assert_eq!(result.status, ResolveStatus::Success);
    let data = result.data.unwrap();
    assert_eq!(data.title, "Test Song");
    assert_eq!(data.formats.len(), 1);
    assert_eq!(data.formats[0].container, "mp3");
    assert_eq!(
        data.formats[0].download_url,
        "https://files.example.com/track.mp3"
    );
    assert!(!data.formats[0].has_video);
    assert!(data.formats[0].has_audio);
    assert_eq!(data.formats[0].note, "Audio");
}

#[tokio::test]
async fn follows_convert_redirects_up_to_the_hop_limit() {
    let server = MockServer::start().await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "convertURL": format!("{}/convert", server.uri()),
        })))
        .mount(&server)
        .await;
    // Every convert response points back at itself; the chain never ends.
    Mock::given(method("GET"))
        .and(path("/convert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "redirect": 1,
            "redirectURL": format!("{}/convert", server.uri()),
        })))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let err = resolver
        .try_resolve(ProviderId::YouTube, WATCH_TEXT)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    assert!(err.message.contains("redirect"), "{}", err.message);

    // Initial call plus the two allowed hops, then the cap trips.
    let convert_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/convert")
        .count();
    assert_eq!(convert_calls, 3);
}

#[tokio::test]
async fn poll_times_out_after_exactly_max_attempts() {
    let server = MockServer::start().await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "convertURL": format!("{}/convert", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/convert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "redirect": 0,
            "downloadURL": "https://files.example.com/track.mp3",
            "progressURL": format!("{}/progress", server.uri()),
        })))
        .mount(&server)
        .await;
    // The conversion never finishes.
    Mock::given(method("GET"))
        .and(path("/progress"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": 0, "progress": 1})),
        )
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let err = resolver
        .try_resolve(ProviderId::YouTube, WATCH_TEXT)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::PollTimeout);
    let poll_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/progress")
        .count();
    assert_eq!(poll_calls, 3);
}

#[tokio::test]
async fn init_timeout_exhausts_the_retry_budget() {
    let server = MockServer::start().await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(400))
                .set_body_json(json!({"error": 0})),
        )
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.request_timeout = Duration::from_millis(50);
    settings.retry_budget = 2;

    let resolver = Resolver::new(settings);
    let err = resolver
        .try_resolve(ProviderId::YouTube, WATCH_TEXT)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    let init_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/api/v1/init")
        .count();
    assert_eq!(init_calls, 2);
}

#[tokio::test]
async fn upstream_error_code_is_authoritative() {
    let server = MockServer::start().await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": 7})))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let err = resolver
        .try_resolve(ProviderId::YouTube, WATCH_TEXT)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conversion);
}

#[tokio::test]
async fn stale_cipher_shape_refreshes_the_session_once() {
    let server = MockServer::start().await;
    // First bootstrap serves a configuration missing its parameter list;
    // the refreshed page is complete.
    let broken = format!(
        "<html><head><script>eval(atob('{}'));</script></head></html>",
        BASE64.encode("var gC = {'0': 'AA==', '1': 'abc'};")
    );
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(broken))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_homepage(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/init"))
        .and(query_param("k", BASE64.encode(EXPECTED_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "convertURL": format!("{}/convert", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/convert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "redirect": 0,
            "downloadURL": "https://files.example.com/track.mp3",
            "progressURL": format!("{}/progress", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "progress": 3,
            "title": "Recovered",
        })))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let result = resolver.resolve(ProviderId::YouTube, WATCH_TEXT).await;

    assert_eq!(result.status, ResolveStatus::Success);
    assert_eq!(result.data.unwrap().title, "Recovered");
    let bootstrap_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/")
        .count();
    assert_eq!(bootstrap_calls, 2);
}
