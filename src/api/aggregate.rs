//! Folds a finished chunk stream into one `chat.completion` object for
//! clients that asked for `stream: false`.

use futures_util::{Stream, StreamExt};

use crate::error::BridgeError;
use crate::protocol::openai_chat::response::COMPLETION_OBJECT;
use crate::protocol::openai_chat::{
    ChatCompletion, ChatCompletionChunk, CompletionChoice, CompletionMessage, FinishReason, Usage,
};
use crate::stream::sse::is_done_event;
use crate::stream::SseParser;

const AGGREGATE_ERROR_STATUS: u16 = 502;

#[derive(Default)]
struct Accumulator {
    id: String,
    model: String,
    created: u64,
    message: CompletionMessage,
    citations: Vec<String>,
    usage: Option<Usage>,
    seen_first: bool,
}

impl Accumulator {
    fn absorb(&mut self, chunk: ChatCompletionChunk) -> Result<(), BridgeError> {
        if let Some(error) = chunk.error {
            return Err(BridgeError::Upstream {
                status: AGGREGATE_ERROR_STATUS,
                message: error.message,
            });
        }
        if !self.seen_first {
            self.seen_first = true;
            self.id = chunk.id;
            self.model = chunk.model;
            self.created = chunk.created;
        }
        if !chunk.citations.is_empty() {
            self.citations = chunk.citations;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        if let Some(choice) = chunk.choices.into_iter().next() {
            let delta = choice.delta;
            self.message.content.push_str(&delta.content);
            self.message
                .reasoning_content
                .push_str(&delta.reasoning_content);
            self.message.tool_calls.extend(delta.tool_calls);
        }
        Ok(())
    }

    fn into_completion(self) -> ChatCompletion {
        let finish_reason = if self.message.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        ChatCompletion {
            id: self.id,
            object: COMPLETION_OBJECT.to_string(),
            created: self.created,
            model: self.model,
            choices: vec![CompletionChoice {
                index: 0,
                message: self.message,
                finish_reason: Some(finish_reason),
            }],
            citations: self.citations,
            usage: self.usage,
        }
    }
}

/// Drain `frames` and build the equivalent non-streaming completion.
///
/// # Errors
///
/// Returns [`BridgeError::Upstream`] when the stream carried an error frame
/// and [`BridgeError::Internal`] when a frame cannot be decoded.
pub async fn collect_completion<S, E>(frames: S) -> Result<ChatCompletion, BridgeError>
where
    S: Stream<Item = Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
{
    let mut frames = std::pin::pin!(frames);
    let mut parser = SseParser::new();
    let mut events = Vec::with_capacity(4);
    let mut acc = Accumulator::default();

    while let Some(frame) = frames.next().await {
        let frame = frame.map_err(|e| BridgeError::Internal(e.to_string()))?;
        let text = std::str::from_utf8(&frame)
            .map_err(|e| BridgeError::Internal(format!("Non UTF-8 output frame: {e}")))?;
        parser.feed_into(text, &mut events);
        for event in events.drain(..) {
            if is_done_event(&event) {
                continue;
            }
            let chunk: ChatCompletionChunk = serde_json::from_str(&event.data)
                .map_err(|e| BridgeError::Internal(format!("Undecodable output frame: {e}")))?;
            acc.absorb(chunk)?;
        }
    }

    Ok(acc.into_completion())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::ChunkToolCall;
    use crate::stream::{done_frame, openai_sse_frame};
    use bytes::Bytes;
    use std::convert::Infallible;

    fn wire(chunk: &ChatCompletionChunk) -> Result<Bytes, Infallible> {
        Ok(Bytes::from(openai_sse_frame(
            &serde_json::to_string(chunk).unwrap(),
        )))
    }

    fn chunk(content: &str, reasoning: &str) -> ChatCompletionChunk {
        let mut chunk = ChatCompletionChunk::new("chatcmpl-1", "deepseek-r1", 7);
        chunk.delta_mut().content = content.to_string();
        chunk.delta_mut().reasoning_content = reasoning.to_string();
        chunk
    }

    #[tokio::test]
    async fn test_collects_text_reasoning_and_usage() {
        let mut last = chunk("", "");
        last.usage = Some(Usage::new(2, 3));
        last.citations = vec!["https://a".to_string()];
        last.set_finish_reason(FinishReason::Stop);
        let frames = vec![
            wire(&chunk("", "think ")),
            wire(&chunk("Hello ", "")),
            wire(&chunk("world", "")),
            wire(&last),
            Ok(Bytes::from(done_frame())),
        ];

        let completion = collect_completion(futures_util::stream::iter(frames))
            .await
            .unwrap();
        assert_eq!(completion.id, "chatcmpl-1");
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.created, 7);
        let choice = &completion.choices[0];
        assert_eq!(choice.message.content, "Hello world");
        assert_eq!(choice.message.reasoning_content, "think ");
        assert_eq!(choice.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage, Some(Usage::new(2, 3)));
        assert_eq!(completion.citations, vec!["https://a".to_string()]);
    }

    #[tokio::test]
    async fn test_tool_calls_set_finish_reason() {
        let mut call = chunk("", "");
        call.delta_mut().tool_calls.push(ChunkToolCall::function(
            0,
            "call_1".to_string(),
            "search".to_string(),
            "{}".to_string(),
        ));
        call.set_finish_reason(FinishReason::ToolCalls);
        let frames = vec![wire(&call), wire(&chunk("", "")), Ok(Bytes::from(done_frame()))];

        let completion = collect_completion(futures_util::stream::iter(frames))
            .await
            .unwrap();
        let choice = &completion.choices[0];
        assert_eq!(choice.message.tool_calls.len(), 1);
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error_frame_becomes_upstream_error() {
        let failed = chunk("", "").with_error("rejected by server");
        let frames = vec![wire(&chunk("partial", "")), wire(&failed), Ok(Bytes::from(done_frame()))];

        let err = collect_completion(futures_util::stream::iter(frames))
            .await
            .unwrap_err();
        match err {
            BridgeError::Upstream { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "rejected by server");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
