//! Integration tests for the HTTP client
//!
//! These tests use wiremock to stand in for the moderation backend.

use networking::{HttpClient, HttpClientConfig, NetworkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Echo {
    text: String,
}

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(HttpClientConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn test_get_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;

    let value: serde_json::Value = client_for(&server).get_json("/health").await.unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn test_post_json_sends_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/filter/text"))
        .and(body_json(serde_json::json!({"text": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "HELLO"})))
        .expect(1)
        .mount(&server)
        .await;

    let echo: Echo = client_for(&server)
        .post_json("/filter/text", &Echo { text: "hello".to_string() })
        .await
        .unwrap();
    assert_eq!(echo.text, "HELLO");
}

#[tokio::test]
async fn test_default_headers_applied() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .and(header("X-Client", "socio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        HttpClient::new(HttpClientConfig::new(server.uri()).with_header("X-Client", "socio")).unwrap();
    let _: serde_json::Value = client.get_json("/health").await.unwrap();
}

#[tokio::test]
async fn test_non_success_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/filter/image"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let form = reqwest::multipart::Form::new().text("method", "auto");
    let result: Result<serde_json::Value, _> =
        client_for(&server).post_multipart("/filter/image", form).await;

    match result {
        Err(NetworkError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> = client_for(&server).get_json("/health").await;
    assert!(matches!(result, Err(NetworkError::Decode(_))));
}

#[tokio::test]
async fn test_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(
        HttpClientConfig::new(server.uri()).with_timeout(Duration::from_millis(50)),
    )
    .unwrap();

    let result: Result<serde_json::Value, _> = client.get_json("/health").await;
    assert_eq!(result.unwrap_err(), NetworkError::Timeout);
}

#[tokio::test]
async fn test_get_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let bytes = client.get_bytes(&format!("{}/img.png", server.uri())).await.unwrap();
    assert_eq!(bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let client = HttpClient::new(
        HttpClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let error = client.get_json::<serde_json::Value>("/health").await.unwrap_err();
    assert!(error.is_transient());
}
