use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use super::aggregate::collect_completion;
use crate::blocks::prompt::render_tool_prompt;
use crate::config::ModelConfig;
use crate::error::BridgeError;
use crate::observability::token_counter::prompt_text;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::prompt::flatten_messages;
use crate::state::AppState;
use crate::stream::{ChatConfig, ChatFeatures, ChunkTransformer, FrameStream};
use crate::transport::build_vendor_body;

/// `POST /v1/chat/completions`.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handle(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "chat completion failed");
            err.into_response()
        }
    }
}

async fn handle(state: &Arc<AppState>, body: &[u8]) -> Result<Response, BridgeError> {
    let request: OpenAiChatRequest = serde_json::from_slice(body)
        .map_err(|e| BridgeError::InvalidRequest(format!("Malformed request body: {e}")))?;
    if request.messages.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }
    let model = state.config.find_model(&request.model).ok_or_else(|| {
        BridgeError::InvalidRequest(format!("Unknown model '{}'", request.model))
    })?;

    let chat = chat_config(&request, model);
    let preamble = chat.has_tools().then(|| {
        render_tool_prompt(
            &chat.tools,
            &chat.tool_choice,
            state.config.features.tool_prompt_template.as_deref(),
        )
    });
    let flattened = flatten_messages(&request.messages, preamble.as_deref());
    let vendor_body = build_vendor_body(
        &chat,
        model,
        &flattened.prompt,
        &flattened.images,
        &state.config.upstream.agent_id,
    );
    tracing::debug!(
        model = %chat.model_name,
        chat_model_id = %chat.chat_model_id,
        tools = chat.tools.len(),
        images = flattened.images.len(),
        stream = chat.stream,
        "forwarding chat request"
    );

    let upstream = state.transport.send_chat(&vendor_body).await?;
    let stream = chat.stream;
    let (transformer, frames) = ChunkTransformer::new(
        Arc::new(chat),
        Arc::clone(&state.block_parser),
        prompt_text(&request.messages),
    );
    let content_type = upstream.content_type;
    let upstream_body = upstream.body;
    tokio::spawn(async move {
        transformer.run(&content_type, upstream_body).await;
    });

    if stream {
        Ok(sse_ok_response(frames))
    } else {
        let completion = collect_completion(frames).await?;
        Ok((http::StatusCode::OK, axum::Json(completion)).into_response())
    }
}

fn chat_config(request: &OpenAiChatRequest, model: &ModelConfig) -> ChatConfig {
    ChatConfig {
        model_name: request.model.clone(),
        chat_model_id: model.chat_model_id.clone(),
        tools: request.tools.clone().unwrap_or_default(),
        tool_choice: request
            .tool_choice
            .as_ref()
            .map(|choice| choice.normalize())
            .unwrap_or_default(),
        features: ChatFeatures {
            thinking: model.thinking,
            searching: model.searching,
            deep_searching: model.deep_searching,
        },
        stream: request.stream.unwrap_or(false),
    }
}

fn sse_ok_response(frames: FrameStream) -> Response {
    let mut response = Response::new(Body::from_stream(frames));
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::ToolChoice;

    fn model() -> ModelConfig {
        ModelConfig {
            id: "deepseek-r1-search".to_string(),
            chat_model_id: "deep_seek".to_string(),
            thinking: true,
            searching: true,
            deep_searching: false,
            extra_body: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_chat_config_from_request() {
        let request: OpenAiChatRequest = serde_json::from_str(
            r#"{
                "model": "deepseek-r1-search",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "search"}}],
                "tool_choice": {"type": "function", "function": {"name": "search"}},
                "stream": true
            }"#,
        )
        .unwrap();
        let chat = chat_config(&request, &model());
        assert_eq!(chat.model_name, "deepseek-r1-search");
        assert_eq!(chat.chat_model_id, "deep_seek");
        assert!(chat.has_tools());
        assert_eq!(chat.tool_choice, ToolChoice::Specific("search".to_string()));
        assert!(chat.features.thinking && chat.features.searching);
        assert!(chat.stream);
    }

    #[test]
    fn test_chat_config_defaults_to_non_streaming() {
        let request: OpenAiChatRequest = serde_json::from_str(
            r#"{"model": "deepseek-r1-search", "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap();
        let chat = chat_config(&request, &model());
        assert!(!chat.stream);
        assert!(!chat.has_tools());
        assert_eq!(chat.tool_choice, ToolChoice::Auto);
    }
}
