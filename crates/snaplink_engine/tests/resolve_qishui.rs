use std::time::Duration;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snaplink_core::{ErrorKind, ProviderId, ResolveStatus};
use snaplink_engine::{EngineSettings, Resolver};

fn settings(server: &MockServer) -> EngineSettings {
    let mut settings = EngineSettings {
        request_timeout: Duration::from_millis(500),
        retry_budget: 1,
        retry_delay: Duration::from_millis(10),
        ..EngineSettings::default()
    };
    settings.override_endpoints(ProviderId::Qishui, server.uri());
    settings
}

fn track_page() -> String {
    let router_data = r#"{"loaderData": {"track_page": {"audioWithLyricsOption": {"url": "https://audio.example.com/track.m4a"}}}}"#;
    format!(
        r#"<html>
<head><script>window._ROUTER_DATA = {router_data};</script></head>
<body>
  <h1 class="title">Evening Song</h1>
  <span class="artist-name-max">Some Artist</span>
  <img alt="a-image" src="https://cdn.example.com/cover.jpg">
  <div class="ssr-lyric">first line</div>
  <div class="ssr-lyric">second line</div>
  <div class="ssr-lyric">滚动歌词&amp;翻译贡献者: somebody</div>
  <div style="font-size:12px;color:rgba(255, 255, 255, 0.5)">3:25</div>
</body>
</html>"#
    )
}

#[tokio::test]
async fn resolves_audio_from_embedded_router_data() {
    let server = MockServer::start().await;
    // The share link answers with a redirect carrying the track id.
    Mock::given(method("GET"))
        .and(path("/s/abc"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("{}/qishui/share/track?track_id=777", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qishui/share/track"))
        .and(query_param("track_id", "777"))
        .respond_with(ResponseTemplate::new(200).set_body_string(track_page()))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let result = resolver
        .resolve(ProviderId::Qishui, "听听这首 https://qishui.douyin.com/s/abc")
        .await;

    assert_eq!(result.status, ResolveStatus::Success);
    let data = result.data.unwrap();
    assert_eq!(data.title, "Evening Song");
    assert_eq!(data.author, "Some Artist");
    assert_eq!(data.thumbnail, "https://cdn.example.com/cover.jpg");
    assert_eq!(data.duration_seconds, 205);
    assert_eq!(data.lyrics, vec!["first line", "second line"]);
    assert_eq!(data.formats.len(), 1);
    assert_eq!(
        data.formats[0].download_url,
        "https://audio.example.com/track.m4a"
    );
    assert!(data.formats[0].has_audio);
    assert!(!data.formats[0].has_video);
}

#[tokio::test]
async fn falls_back_to_the_zlink_lookup_when_nothing_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>interstitial</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qishui/share/track"))
        .and(query_param("zlink_id", "abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><a href="/player?track_id=888">open</a></html>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qishui/share/track"))
        .and(query_param("track_id", "888"))
        .respond_with(ResponseTemplate::new(200).set_body_string(track_page()))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let result = resolver
        .resolve(ProviderId::Qishui, "https://qishui.douyin.com/s/abc")
        .await;
    assert_eq!(result.status, ResolveStatus::Success);
}

#[tokio::test]
async fn track_page_without_router_data_is_a_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/abc"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("{}/qishui/share/track?track_id=777", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/qishui/share/track"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no data here</html>"))
        .mount(&server)
        .await;

    let resolver = Resolver::new(settings(&server));
    let err = resolver
        .try_resolve(ProviderId::Qishui, "https://qishui.douyin.com/s/abc")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
}
