//! HTTP-level tests for the hosted adapters against a mock server.

use chameleon::backend::{create_backend, BackendConfig, BackendKind, ResponseGenerator};
use chameleon::core::message::Message;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(fragment).unwrap()
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn gemini_sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":{}}}]}}}}]}}\n\n",
            serde_json::to_string(fragment).unwrap()
        ));
    }
    body
}

fn message_pairs(body: &[u8], list_key: &str) -> Vec<(String, String)> {
    let body: serde_json::Value = serde_json::from_slice(body).unwrap();
    body[list_key]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let role = entry["role"].as_str().unwrap().to_string();
            let content = entry
                .get("content")
                .and_then(|c| c.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| entry["parts"][0]["text"].as_str().unwrap().to_string());
            (role, content)
        })
        .collect()
}

#[tokio::test]
async fn openai_submits_ordered_messages_and_accumulates_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body(&["Hel", "lo, ", "", "world"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::default()
        .with_api_key("sk-test")
        .with_base_url(format!("{}/v1", server.uri()));
    let backend = create_backend(BackendKind::OpenAi, &config)
        .await
        .unwrap();

    let history = vec![Message::user("hi"), Message::assistant("hello")];
    let reply = backend.generate("how are you", &history).await.unwrap();
    assert_eq!(reply, "Hello, world");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["stream"], true);
    assert_eq!(
        message_pairs(&requests[0].body, "messages"),
        [
            ("user".to_string(), "hi".to_string()),
            ("assistant".to_string(), "hello".to_string()),
            ("user".to_string(), "how are you".to_string()),
        ]
    );
}

#[tokio::test]
async fn openai_rejection_surfaces_as_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_raw(
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
            "application/json",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let config = BackendConfig::default()
        .with_api_key("sk-bad")
        .with_base_url(format!("{}/v1", server.uri()));
    let backend = create_backend(BackendKind::OpenAi, &config)
        .await
        .unwrap();

    let err = backend.generate("hi", &[]).await.expect_err("401 must fail");
    assert!(err.to_string().contains("Incorrect API key provided"));

    // The adapter stays usable for the next turn.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body(&["ok"]), "text/event-stream"),
        )
        .mount(&server)
        .await;
    assert_eq!(backend.generate("hi", &[]).await.unwrap(), "ok");
}

#[tokio::test]
async fn empty_api_key_fails_before_any_request() {
    let server = MockServer::start().await;

    for kind in [BackendKind::OpenAi, BackendKind::Gemini] {
        let config = BackendConfig::default()
            .with_api_key("")
            .with_base_url(server.uri());
        assert!(create_backend(kind, &config).await.is_err());
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn gemini_remaps_assistant_to_model_and_accumulates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "g-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(gemini_sse_body(&["Hel", "lo, ", "world"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::default()
        .with_api_key("g-test")
        .with_base_url(server.uri());
    let backend = create_backend(BackendKind::Gemini, &config)
        .await
        .unwrap();

    let history = vec![Message::user("hi"), Message::assistant("hello")];
    let reply = backend.generate("how are you", &history).await.unwrap();
    assert_eq!(reply, "Hello, world");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        message_pairs(&requests[0].body, "contents"),
        [
            ("user".to_string(), "hi".to_string()),
            ("model".to_string(), "hello".to_string()),
            ("user".to_string(), "how are you".to_string()),
        ]
    );
}

#[tokio::test]
async fn gemini_error_body_surfaces_as_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let config = BackendConfig::default()
        .with_api_key("g-bad")
        .with_base_url(server.uri());
    let backend = create_backend(BackendKind::Gemini, &config)
        .await
        .unwrap();

    let err = backend.generate("hi", &[]).await.expect_err("400 must fail");
    assert!(err.to_string().contains("API key not valid"));
}
