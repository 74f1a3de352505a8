//! Integration tests for the completion and image client against a mock API server.

use chatrelay::chatbot::openai::{Backend, Client, CompletionParams, Error, MISSING_TEXT_MARKER};
use mockito::Matcher;
use serde_json::json;

fn params() -> CompletionParams {
    CompletionParams {
        model: "text-davinci-003".to_string(),
        max_tokens: 300,
        temperature: 0.5,
        frequency_penalty: 1.0,
        presence_penalty: Some(0.2),
    }
}

fn client(server: &mockito::ServerGuard) -> Client {
    Client::new("sk-test".to_string(), format!("{}/", server.url()))
}

#[tokio::test]
async fn test_completion_request_and_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Json(json!({
            "model": "text-davinci-003",
            "prompt": "alice: ###hi###\nopenAI: ###",
            "temperature": 0.5,
            "max_tokens": 300,
            "frequency_penalty": 1.0,
            "presence_penalty": 0.2,
            "stop": ["###"]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"text": " Hello!", "index": 0}], "usage": {"total_tokens": 17}}"#)
        .create_async()
        .await;

    let completion = client(&server)
        .complete("alice: ###hi###\nopenAI: ###", &params())
        .await
        .expect("completion should succeed");

    mock.assert_async().await;
    assert_eq!(completion.text, " Hello!");
    assert_eq!(completion.total_tokens, Some(17));
}

#[tokio::test]
async fn test_missing_text_becomes_marker() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"text": ""}]}"#)
        .create_async()
        .await;

    let completion = client(&server).complete("prompt", &params()).await.unwrap();
    assert_eq!(completion.text, MISSING_TEXT_MARKER);
    assert_eq!(completion.total_tokens, None);
}

#[tokio::test]
async fn test_whitespace_text_becomes_marker() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"text": "\n  "}], "usage": {"total_tokens": 9}}"#)
        .create_async()
        .await;

    let completion = client(&server).complete("prompt", &params()).await.unwrap();
    assert_eq!(completion.text, MISSING_TEXT_MARKER);
    assert_eq!(completion.total_tokens, Some(9));
}

#[tokio::test]
async fn test_completion_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/completions")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "Rate limit reached", "type": "requests", "code": null}}"#)
        .create_async()
        .await;

    match client(&server).complete("prompt", &params()).await {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 429);
            assert_eq!(message, "Rate limit reached");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_completion_garbage_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/completions")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let result = client(&server).complete("prompt", &params()).await;
    assert!(matches!(result, Err(Error::Parse(_))));
}

#[tokio::test]
async fn test_transport_error() {
    let client = Client::new("sk-test".to_string(), "http://127.0.0.1:1".to_string());
    let result = client.complete("prompt", &params()).await;
    assert!(matches!(result, Err(Error::Http(_))));
}

#[tokio::test]
async fn test_image_generation() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/images/generations")
        .match_body(Matcher::PartialJson(json!({
            "prompt": "a red fox in snow",
            "response_format": "url"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"created": 1, "data": [{"url": "https://images.example/fox.png"}]}"#)
        .create_async()
        .await;

    let url = client(&server).generate_image("a red fox in snow").await.unwrap();

    mock.assert_async().await;
    assert_eq!(url, "https://images.example/fox.png");
}

#[tokio::test]
async fn test_image_safety_rejection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/images/generations")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"error": {"code": "content_policy_violation", "message": "Your request was rejected as a result of our safety system.", "type": "invalid_request_error"}}"#,
        )
        .create_async()
        .await;

    let result = client(&server).generate_image("something forbidden").await;
    assert!(matches!(result, Err(Error::ContentPolicy(_))), "got {result:?}");
}

#[tokio::test]
async fn test_image_without_url() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;

    let result = client(&server).generate_image("anything").await;
    assert!(matches!(result, Err(Error::Empty)));
}
