pub mod engine;
pub mod render;
pub mod sink;
pub mod sse;
pub mod transformer;

pub use engine::EmissionEngine;
pub use sink::{frame_channel, FrameSink, FrameStream};
pub use sse::{done_frame, openai_sse_frame, SseParser, Utf8ChunkDecoder};
pub use transformer::ChunkTransformer;

use crate::protocol::openai_chat::{OpenAiTool, ToolChoice};

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Vendor feature switches requested for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatFeatures {
    pub thinking: bool,
    pub searching: bool,
    pub deep_searching: bool,
}

/// Per-stream configuration, fixed before the first vendor byte is read.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    /// Model name echoed in every output frame.
    pub model_name: String,
    pub chat_model_id: String,
    pub tools: Vec<OpenAiTool>,
    pub tool_choice: ToolChoice,
    pub features: ChatFeatures,
    pub stream: bool,
}

impl ChatConfig {
    /// Whether output goes through block extraction.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}
