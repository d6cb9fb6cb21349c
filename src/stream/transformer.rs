//! Vendor response → OpenAI chunk stream.
//!
//! Owns the read loop: upstream bytes are decoded to text, split into SSE
//! events, decoded into vendor chunks, and folded into the
//! [`EmissionEngine`] strictly in arrival order.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use super::engine::EmissionEngine;
use super::render::render_chunk;
use super::sink::{frame_channel, FrameStream};
use super::sse::{SseParser, Utf8ChunkDecoder};
use super::{ChatConfig, SseEvent};
use crate::blocks::BlockParser;
use crate::error::BridgeError;
use crate::protocol::vendor::{decode_event_data, VendorChunk};

const EVENT_STREAM: &str = "text/event-stream";
const HTML: &str = "text/html";
const REJECTED_BY_SERVER: &str = "rejected by server";
const UNKNOWN_ERROR: &str = "unknown error";

pub struct ChunkTransformer {
    engine: EmissionEngine,
}

impl ChunkTransformer {
    /// Build a transformer and the frame stream it will write to.
    #[must_use]
    pub fn new(
        config: Arc<ChatConfig>,
        parser: Arc<dyn BlockParser>,
        prompt_text: String,
    ) -> (Self, FrameStream) {
        let (sink, frames) = frame_channel();
        let engine = EmissionEngine::new(config, parser, sink, prompt_text);
        (Self { engine }, frames)
    }

    /// Register a handler run once after the output closes.
    pub fn on_done(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.engine.on_done(callback);
    }

    /// Consume the upstream response until it ends or fails.
    ///
    /// Every path ends with the terminal frame, `[DONE]`, and a closed sink.
    pub async fn run<S, E>(mut self, content_type: &str, body: S)
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let body = std::pin::pin!(body);
        if !content_type.contains(EVENT_STREAM) {
            self.reject(content_type, body).await;
            return;
        }
        if let Err(message) = self.read_events(body).await {
            self.engine.fail(&message);
            return;
        }
        self.engine.finish();
    }

    async fn reject<S, E>(&mut self, content_type: &str, mut body: S)
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut raw = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => raw.extend_from_slice(&bytes),
                Err(e) => {
                    self.engine.fail(&error_message(&e));
                    return;
                }
            }
        }
        let message = if is_html(content_type) {
            REJECTED_BY_SERVER.to_string()
        } else {
            String::from_utf8_lossy(&raw).into_owned()
        };
        self.engine.fail(&message);
    }

    async fn read_events<S, E>(&mut self, mut body: S) -> Result<(), String>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut decoder = Utf8ChunkDecoder::new();
        let mut parser = SseParser::new();
        let mut events: Vec<SseEvent> = Vec::with_capacity(8);

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| error_message(&e))?;
            parser.feed_into(&decoder.decode(&bytes), &mut events);
            self.handle_events(&mut events)
                .map_err(|e| e.to_string())?;
        }

        parser.feed_into(&decoder.finish(), &mut events);
        events.extend(parser.finish());
        self.handle_events(&mut events).map_err(|e| e.to_string())
    }

    fn handle_events(&mut self, events: &mut Vec<SseEvent>) -> Result<(), BridgeError> {
        for event in events.drain(..) {
            let Some(chunk) = decode_event_data(&event.data)? else {
                continue;
            };
            debug!(kind = ?chunk.kind(), "vendor chunk");
            self.fold(&chunk);
        }
        Ok(())
    }

    fn fold(&mut self, chunk: &VendorChunk) {
        match chunk {
            VendorChunk::Text(text) => {
                if !text.msg.is_empty() {
                    self.engine.push_content(&text.msg);
                }
            }
            VendorChunk::Think(think) => {
                if !think.content.is_empty() {
                    self.engine.push_reasoning(&think.content);
                }
            }
            VendorChunk::SearchGuid(search) => {
                let urls = search.docs.iter().map(|doc| doc.url.clone()).collect();
                self.engine.replace_citations(urls);
            }
            other => {
                if let Some(markdown) = render_chunk(other) {
                    self.engine.push_content(&markdown);
                }
            }
        }
    }
}

fn is_html(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..HTML.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(HTML))
}

fn error_message(err: &impl Display) -> String {
    let message = err.to_string();
    if message.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}
