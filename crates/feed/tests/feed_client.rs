use std::time::Duration;

use feed::{FeedClient, FeedError, FeedSource, Observation};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>, timeout: Duration) -> FeedClient {
    FeedClient::new(
        format!("{}/live", server.uri()),
        token.map(str::to_string),
        timeout,
    )
    .expect("client should build")
}

#[tokio::test]
async fn fetches_records_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 101, "tempo": 12, "time-casa": "A", "time-visitante": "B"},
            {"id": "102", "tempo": 80},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("secret"), Duration::from_secs(2));
    assert_eq!(client.url(), format!("{}/live", server.uri()));
    let records = client.fetch_live().await.expect("fetch should succeed");
    assert_eq!(records.len(), 2);

    let first = Observation::from_record(records[0].clone()).expect("valid record");
    assert_eq!(first.entity_id, "101");
    assert_eq!(first.clock, 12);
}

#[tokio::test]
async fn empty_array_means_no_live_matches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, None, Duration::from_secs(2));
    let records = client.fetch_live().await.expect("empty feed is not an error");
    assert!(records.is_empty());
}

#[tokio::test]
async fn skips_non_object_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "E1", "tempo": 5},
            "garbage",
            null,
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server, None, Duration::from_secs(2));
    let records = client.fetch_live().await.expect("fetch should succeed");
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, None, Duration::from_secs(2));
    let err = client.fetch_live().await.expect_err("503 should fail");
    assert!(matches!(err, FeedError::Status(status) if status.as_u16() == 503));
}

#[tokio::test]
async fn object_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "quota"})))
        .mount(&server)
        .await;

    let client = client_for(&server, None, Duration::from_secs(2));
    let err = client.fetch_live().await.expect_err("object body should fail");
    assert!(matches!(err, FeedError::NotAnArray("object")));
}

#[tokio::test]
async fn slow_feed_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, None, Duration::from_millis(100));
    let err = client.fetch_live().await.expect_err("should time out");
    assert!(matches!(err, FeedError::Timeout(_)), "got {err:?}");
}
