// HTTP generator tests against a mock provider
// Author: kelexine (https://github.com/kelexine)

use genguard::cache::RequestType;
use genguard::config::UpstreamConfig;
use genguard::upstream::{ContentGenerator, GenerationPrompt, OpenAiGenerator, UpstreamErrorKind};
use mockito::Matcher;
use serde_json::json;

fn generator(base_url: String) -> OpenAiGenerator {
    OpenAiGenerator::new(&UpstreamConfig {
        api_base_url: base_url,
        api_key: Some("sk-test-key".to_string()),
        ..Default::default()
    })
    .unwrap()
}

fn prompt_for(request_type: RequestType) -> GenerationPrompt {
    GenerationPrompt {
        request_type,
        input: json!("Modern 3BR apartment, downtown"),
    }
}

fn completion(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

#[tokio::test]
async fn test_structured_completion_is_parsed() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion(r#"{"headline": "Light-filled downtown 3BR"}"#))
        .create_async()
        .await;

    let value = generator(server.url())
        .generate(&prompt_for(RequestType::GenerateAll))
        .await
        .unwrap();
    assert_eq!(value, json!({"headline": "Light-filled downtown 3BR"}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_free_text_completion_is_kept_as_string() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": "gpt-4o-mini"})))
        .with_status(200)
        .with_body(completion("Just a sentence."))
        .create_async()
        .await;

    let value = generator(server.url())
        .generate(&prompt_for(RequestType::ListingDescription))
        .await
        .unwrap();
    assert_eq!(value, json!("Just a sentence."));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let cases = [
        (503, r#"{"error":{"message":"overloaded","type":"server_error"}}"#, UpstreamErrorKind::Status(503), true),
        (429, r#"{"error":{"message":"Rate limit reached","code":"rate_limit_exceeded"}}"#, UpstreamErrorKind::Status(429), true),
        (429, r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#, UpstreamErrorKind::QuotaExhausted, false),
        (400, r#"{"error":{"message":"bad prompt","type":"invalid_request_error"}}"#, UpstreamErrorKind::Status(400), false),
    ];

    for (status, body, kind, retryable) in cases {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;

        let err = generator(server.url()).generate(&prompt_for(RequestType::Audit)).await.unwrap_err();
        assert_eq!(err.kind, kind, "status {}", status);
        assert_eq!(err.is_retryable(), retryable, "status {}", status);
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = generator(server.url()).generate(&prompt_for(RequestType::Audit)).await.unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::InvalidResponse);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_refused_connection_is_retryable() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = generator(format!("http://{}", addr))
        .generate(&prompt_for(RequestType::Audit))
        .await
        .unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::Connection);
    assert!(err.is_retryable());
}
