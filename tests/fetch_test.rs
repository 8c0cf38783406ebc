//! Integration tests for the reqwest-backed fetcher against a mock server.

use std::sync::Arc;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;
use vodcheck::config::{Config, FetchConfig};
use vodcheck::fetch::ReqwestFetcher;
use vodcheck::Verifier;
use vodcheck_common::IssueKind;
use vodcheck_manifest::{ByteRange, FetchError, FetchRequest, Fetcher};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(config: FetchConfig) -> ReqwestFetcher {
    ReqwestFetcher::new(&config).unwrap()
}

#[tokio::test]
async fn plain_get_returns_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/master.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("#EXTM3U\n", "application/vnd.apple.mpegurl"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/master.m3u8", server.uri());
    let response = fetcher(FetchConfig::default())
        .fetch(&FetchRequest::new(&url))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "#EXTM3U\n");
    assert_eq!(response.content_type(), Some("application/vnd.apple.mpegurl"));
}

#[tokio::test]
async fn range_and_request_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/frag.m4s"))
        .and(header("range", "bytes=0-65535"))
        .and(header("x-token", "abc"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/frag.m4s", server.uri());
    let request = FetchRequest::new(&url)
        .with_headers(&[("X-Token".to_string(), "abc".to_string())])
        .with_range(ByteRange::new(0, 65536));
    let response = fetcher(FetchConfig::default()).fetch(&request).await.unwrap();

    assert_eq!(response.status, 206);
    assert_eq!(response.body.len(), 64);
}

#[tokio::test]
async fn server_errors_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 188]))
        .mount(&server)
        .await;

    let config = FetchConfig {
        retries: 1,
        ..FetchConfig::default()
    };
    let url = format!("{}/flaky.ts", server.uri());
    let response = fetcher(config).fetch(&FetchRequest::new(&url)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.len(), 188);
}

#[tokio::test]
async fn no_retry_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/broken.ts", server.uri());
    let response = fetcher(FetchConfig::default())
        .fetch(&FetchRequest::new(&url))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
}

#[tokio::test]
async fn oversized_body_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_body_bytes: 1024,
        ..FetchConfig::default()
    };
    let url = format!("{}/big.ts", server.uri());
    let result = fetcher(config).fetch(&FetchRequest::new(&url)).await;
    assert_matches!(result, Err(FetchError::BodyTooLarge { limit: 1024, .. }));
}

#[tokio::test]
async fn oversized_segment_reported_as_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4,\ns1.ts\n#EXT-X-ENDLIST\n",
                    "application/vnd.apple.mpegurl",
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/s1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 4096]))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.fetch.max_body_bytes = 1024;
    let verifier = Verifier::new(Arc::new(fetcher(config.fetch.clone())), config);
    let url = format!("{}/v/index.m3u8", server.uri());
    let report = verifier.run(&url, CancellationToken::new()).await.unwrap();

    assert_eq!(report.count(IssueKind::DecodeFailure), 1);
    let failure = &report.issues[0];
    assert_eq!(failure.url.as_deref(), Some(format!("{}/v/s1.ts", server.uri()).as_str()));
    assert!(failure.detail.contains("1024"));
}

#[tokio::test]
async fn g2o_headers_signed_when_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_exists("x-akamai-g2o-auth-data"))
        .and(header_exists("x-akamai-g2o-auth-sign"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = FetchConfig::default();
    config.g2o.key = "secret".to_string();
    let url = format!("{}/signed.ts?x=1", server.uri());
    let response = fetcher(config).fetch(&FetchRequest::new(&url)).await.unwrap();
    assert_eq!(response.status, 200);
}
