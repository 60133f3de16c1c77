//! REST client tests
//!
//! Rate-limit behavior of `RestClient` across several calls, against a wiremock server.
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use integration_tests::*;
use nya_core::Snowflake;
use nya_rest::{RestClient, RestError};
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> RestClient {
    RestClient::new(rest_config(&server.uri())).unwrap()
}

fn exhausted(reset_after: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-ratelimit-remaining", "0")
        .insert_header("x-ratelimit-reset-after", reset_after)
        .set_body_json(json!({"id": "1"}))
}

#[tokio::test]
async fn test_exhausted_route_waits_for_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/10/messages/1"))
        .respond_with(exhausted("0.3"))
        .mount(&server)
        .await;

    let client = client(&server).await;
    client.get("/channels/10/messages/1").await.unwrap();

    let start = Instant::now();
    client.get("/channels/10/messages/1").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_other_routes_are_not_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/10/messages/1"))
        .respond_with(exhausted("5"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/20/messages/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "2"})))
        .mount(&server)
        .await;

    let client = client(&server).await;
    client.get("/channels/10/messages/1").await.unwrap();

    let start = Instant::now();
    let other = client.get("/channels/20/messages/1").await.unwrap();
    assert_eq!(other, Some(json!({"id": "2"})));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_global_limit_blocks_every_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset-after", "0.3")
                .insert_header("x-ratelimit-global", "true")
                .set_body_json(json!({"id": "1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "5"})))
        .mount(&server)
        .await;

    let client = client(&server).await;
    client.get_current_user().await.unwrap();

    let start = Instant::now();
    let guild = client.get_guild(Snowflake::new(5)).await.unwrap();
    assert_eq!(guild["id"], "5");
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_concurrent_calls_share_the_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .respond_with(exhausted("0.3"))
        .mount(&server)
        .await;

    let client = client(&server).await;
    client.send_message(Snowflake::new(7), "first").await.unwrap();

    let start = Instant::now();
    let (a, b) = tokio::join!(
        client.send_message(Snowflake::new(7), "second"),
        client.send_message(Snowflake::new(7), "third"),
    );
    a.unwrap();
    b.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_rate_limited_response_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 0.2, "global": false})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .and(body_json(json!({"content": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "99", "content": "hello"})))
        .expect(1)
        .mount(&server)
        .await;

    let start = Instant::now();
    let message = client(&server)
        .await
        .send_message(Snowflake::new(7), "hello")
        .await
        .unwrap();
    assert_eq!(message["id"], "99");
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_persistent_rate_limit_surfaces_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 0.01, "global": false})),
        )
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server).await.get("/users/@me").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_requests_are_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .and(header("authorization", format!("Bot {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "wss://gateway.example",
            "shards": 3,
            "session_start_limit": {"total": 1000, "remaining": 999, "reset_after": 0, "max_concurrency": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bot = client(&server).await.get_gateway_bot().await.unwrap();
    assert_eq!(bot.shards, 3);
    assert_eq!(bot.url, "wss://gateway.example");
    assert_eq!(bot.session_start_limit.unwrap().max_concurrency, 1);
}

#[tokio::test]
async fn test_api_error_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown Channel", "code": 10003})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .get_channel(Snowflake::new(404))
        .await
        .unwrap_err();
    match err {
        RestError::Api { status, message, code } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "Unknown Channel");
            assert_eq!(code, Some(10003));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
