use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use yuanbao_bridge::config::parse_config;
use yuanbao_bridge::routing::dispatch::dispatch_request;
use yuanbao_bridge::state::AppState;

const VENDOR_SSE: &str = "data: {\"type\":\"think\",\"content\":\"pondering\"}\n\n\
data: {\"type\":\"text\",\"msg\":\"Hello \"}\n\n\
data: {\"type\":\"text\",\"msg\":\"world\"}\n\n\
data: [plugin: ]\n\n\
data: [DONE]\n\n";

const VENDOR_TOOL_SSE: &str = "data: {\"type\":\"text\",\"msg\":\"<function_call><tool>search</tool>\"}\n\n\
data: {\"type\":\"text\",\"msg\":\"<args_json><![CDATA[{\\\"q\\\":\\\"rust\\\"}]]></args_json></function_call>\"}\n\n";

#[derive(Clone, Default)]
struct Captured {
    body: Arc<Mutex<Option<Value>>>,
    cookie: Arc<Mutex<Option<String>>>,
}

async fn spawn_vendor(
    content_type: &'static str,
    payload: &'static str,
) -> (String, Captured, tokio::task::JoinHandle<()>) {
    let captured = Captured::default();
    let sink = captured.clone();
    let app = Router::new().route(
        "/api/chat/conv",
        post(move |headers: HeaderMap, body: axum::body::Bytes| {
            let sink = sink.clone();
            async move {
                *sink.body.lock().unwrap() = serde_json::from_slice(&body).ok();
                *sink.cookie.lock().unwrap() = headers
                    .get(header::COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);
                ([(header::CONTENT_TYPE, content_type)], payload)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock vendor");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api/chat/conv"), captured, server)
}

fn build_state(chat_url: &str) -> Arc<AppState> {
    let config = parse_config(&format!(
        r"
upstream:
  chat_url: {chat_url}
  headers:
    cookie: hy_token=secret
models:
  - id: deepseek-r1
    chat_model_id: deep_seek
    thinking: true
  - id: deepseek-r1-search
    chat_model_id: deep_seek
    searching: true
"
    ))
    .expect("valid config");
    Arc::new(AppState::new(config).expect("state"))
}

async fn post_chat(state: Arc<AppState>, body: Value) -> axum::response::Response {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize request")))
        .expect("build request");
    dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn data_frames(wire: &str) -> Vec<Value> {
    wire.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("json frame"))
        .collect()
}

#[tokio::test]
async fn test_streaming_chat_forward() {
    let (url, captured, server) = spawn_vendor("text/event-stream", VENDOR_SSE).await;
    let state = build_state(&url);

    let response = post_chat(
        state,
        json!({
            "model": "deepseek-r1",
            "messages": [{"role": "user", "content": "say hello"}],
            "stream": true
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let wire = body_text(response).await;
    assert!(wire.ends_with("data: [DONE]\n\n"));
    let frames = data_frames(&wire);
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0]["choices"][0]["delta"]["reasoning_content"], "pondering");
    assert_eq!(frames[1]["choices"][0]["delta"]["content"], "Hello ");
    assert_eq!(frames[2]["choices"][0]["delta"]["content"], "world");
    assert_eq!(frames[3]["choices"][0]["finish_reason"], "stop");
    assert_eq!(frames[3]["model"], "deepseek-r1");
    assert!(frames[3]["usage"]["total_tokens"].as_u64().unwrap() > 0);

    let vendor_body = captured.body.lock().unwrap().clone().expect("vendor body");
    assert_eq!(vendor_body["prompt"], "say hello");
    assert_eq!(vendor_body["chatModelId"], "deep_seek");
    assert_eq!(
        captured.cookie.lock().unwrap().as_deref(),
        Some("hy_token=secret")
    );

    server.abort();
}

#[tokio::test]
async fn test_non_streaming_chat_is_aggregated() {
    let (url, _captured, server) = spawn_vendor("text/event-stream", VENDOR_SSE).await;
    let state = build_state(&url);

    let response = post_chat(
        state,
        json!({
            "model": "deepseek-r1",
            "messages": [{"role": "user", "content": "say hello"}]
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(payload["object"], "chat.completion");
    assert_eq!(payload["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(payload["choices"][0]["message"]["reasoning_content"], "pondering");
    assert_eq!(payload["choices"][0]["finish_reason"], "stop");

    server.abort();
}

#[tokio::test]
async fn test_tool_call_forward_injects_prompt() {
    let (url, captured, server) = spawn_vendor("text/event-stream", VENDOR_TOOL_SSE).await;
    let state = build_state(&url);

    let response = post_chat(
        state,
        json!({
            "model": "deepseek-r1-search",
            "messages": [{"role": "user", "content": "find rust news"}],
            "tools": [{
                "type": "function",
                "function": {"name": "search", "description": "Search the web"}
            }],
            "stream": true
        }),
    )
    .await;
    let frames = data_frames(&body_text(response).await);
    assert_eq!(frames.len(), 2);
    let call = &frames[0]["choices"][0]["delta"]["tool_calls"][0];
    assert_eq!(call["function"]["name"], "search");
    assert_eq!(call["function"]["arguments"], "{\"q\":\"rust\"}");
    assert_eq!(frames[0]["choices"][0]["finish_reason"], "tool_calls");

    let vendor_body = captured.body.lock().unwrap().clone().expect("vendor body");
    let prompt = vendor_body["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("System: "));
    assert!(prompt.contains("search"));
    assert!(prompt.contains("User: find rust news"));
    assert_eq!(
        vendor_body["supportFunctions"],
        json!(["openInternetSearch"])
    );

    server.abort();
}

#[tokio::test]
async fn test_html_rejection_aggregates_to_bad_gateway() {
    let (url, _captured, server) = spawn_vendor("text/html", "<html>Error</html>").await;
    let state = build_state(&url);

    let response = post_chat(
        state,
        json!({
            "model": "deepseek-r1",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert!(payload["error"]["message"]
        .as_str()
        .unwrap()
        .contains("rejected by server"));

    server.abort();
}

#[tokio::test]
async fn test_request_validation_errors() {
    let state = build_state("http://127.0.0.1:9/api/chat/conv");

    let response = post_chat(
        Arc::clone(&state),
        json!({"model": "unknown", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_chat(
        Arc::clone(&state),
        json!({"model": "deepseek-r1", "messages": []}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .body(Body::from("{not json"))
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let state = build_state("http://127.0.0.1:9/api/chat/conv");

    let request = Request::builder()
        .method("GET")
        .uri("/bridge")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), Arc::<str>::from("/bridge"), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(payload["config"]["models_count"], 2);

    let request = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
