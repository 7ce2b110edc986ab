//! OpenAI transport tests against a local fake provider.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use whisperdraft::completion::{
    ChatCompletionRequest, CompletionClient, CompletionError, CompletionOptions,
    CompletionTransport, OpenAiTransport,
};

const GOOD_KEY: &str = "sk-good";
const LIMITED_KEY: &str = "sk-limited";

#[derive(Clone, Default)]
struct FakeProvider {
    bodies: Arc<Mutex<Vec<Value>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn chat_completions(
    State(provider): State<FakeProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    provider.bodies.lock().unwrap().push(body.clone());

    match bearer(&headers).as_deref() {
        Some(GOOD_KEY) => {}
        Some(LIMITED_KEY) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": {
                        "message": "Rate limit reached for requests",
                        "type": "requests",
                        "code": "rate_limit_exceeded"
                    }
                })),
            )
                .into_response();
        }
        _ => return (StatusCode::UNAUTHORIZED, "no entry").into_response(),
    }

    if body["stream"].as_bool().unwrap_or(false) {
        let events = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Quiet \"}}]}\n\n",
            "data: {not json}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"reply\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        return ([("content-type", "text/event-stream")], events).into_response();
    }

    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "A gentle observation." },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
    }))
    .into_response()
}

async fn models(headers: HeaderMap) -> Response {
    match bearer(&headers).as_deref() {
        Some(GOOD_KEY) => Json(json!({ "object": "list", "data": [] })).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" }
            })),
        )
            .into_response(),
    }
}

async fn spawn_provider() -> (String, FakeProvider) {
    let provider = FakeProvider::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models))
        .with_state(provider.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), provider)
}

fn transport(base_url: &str) -> OpenAiTransport {
    OpenAiTransport::new(base_url, Duration::from_secs(5)).unwrap()
}

fn request() -> ChatCompletionRequest {
    ChatCompletionRequest::new(
        "Recent changes:\n+ hello",
        "Be brief.",
        &CompletionOptions::default(),
    )
}

#[tokio::test]
async fn test_chat_completion_success() {
    let (base_url, provider) = spawn_provider().await;

    let response = transport(&base_url)
        .chat_completion(GOOD_KEY, &request())
        .await
        .unwrap();
    assert_eq!(response.text(), Some("A gentle observation."));
    assert_eq!(response.usage.unwrap().total_tokens, 16);

    let bodies = provider.bodies.lock().unwrap();
    assert_eq!(bodies[0]["model"], "gpt-4o");
    assert_eq!(bodies[0]["messages"][0]["role"], "system");
    assert_eq!(bodies[0]["messages"][1]["content"], "Recent changes:\n+ hello");
    assert!(bodies[0].get("stream").is_none());
}

#[tokio::test]
async fn test_rate_limit_envelope_is_parsed() {
    let (base_url, _provider) = spawn_provider().await;

    let err = transport(&base_url)
        .chat_completion(LIMITED_KEY, &request())
        .await
        .unwrap_err();
    assert_eq!(err.upstream_status(), Some(429));
    assert_eq!(err.upstream_code(), Some("rate_limit_exceeded"));
    assert!(err.is_rate_limited());
    assert!(err.to_string().contains("Rate limit reached"));
}

#[tokio::test]
async fn test_plain_error_body_kept_as_message() {
    let (base_url, _provider) = spawn_provider().await;

    let err = transport(&base_url)
        .chat_completion("sk-unknown", &request())
        .await
        .unwrap_err();
    match err {
        CompletionError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 401);
            assert!(code.is_none());
            assert_eq!(message, "no entry");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_streaming_skips_malformed_chunks() {
    let (base_url, provider) = spawn_provider().await;

    let mut chunks: Vec<String> = Vec::new();
    transport(&base_url)
        .stream_chat_completion(GOOD_KEY, &request(), &mut |c: &str| {
            chunks.push(c.to_string())
        })
        .await
        .unwrap();

    assert_eq!(chunks, vec!["Quiet ".to_string(), "reply".to_string()]);
    assert_eq!(provider.bodies.lock().unwrap()[0]["stream"], true);
}

#[tokio::test]
async fn test_models_probe() {
    let (base_url, _provider) = spawn_provider().await;
    let transport = transport(&base_url);

    assert!(transport.list_models(GOOD_KEY).await.is_ok());
    let err = transport.list_models("sk-bad").await.unwrap_err();
    assert_eq!(err.upstream_code(), Some("invalid_api_key"));
}

#[tokio::test]
async fn test_unreachable_provider_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport(&format!("http://{addr}/v1"))
        .chat_completion(GOOD_KEY, &request())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "network_error");
}

#[tokio::test]
async fn test_client_over_http_uses_shared_key() {
    let (base_url, _provider) = spawn_provider().await;
    let client = CompletionClient::new(
        Arc::new(transport(&base_url)),
        Some(GOOD_KEY.to_string()),
    );

    let text = client
        .generate_response("Hello", "Be brief.", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "A gentle observation.");
    assert!(client.check_availability(None).await);
    assert!(!client.check_availability(Some("sk-bad")).await);
}
