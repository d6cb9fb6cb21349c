use serde::{Deserialize, Serialize};

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const COMPLETION_OBJECT: &str = "chat.completion";
const ASSISTANT_ROLE: &str = "assistant";
const SERVER_ERROR_TYPE: &str = "server error";

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

/// Token usage attached to the terminal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// In-band error carried by a chunk once the stream has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkError {
    pub message: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

/// A complete tool call; the bridge never splits arguments across frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkToolCall {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub function: ToolCallFunction,
}

impl ChunkToolCall {
    #[must_use]
    pub fn function(index: u32, id: String, name: String, arguments: String) -> Self {
        Self {
            index,
            id,
            type_: "function".to_string(),
            function: ToolCallFunction { name, arguments },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub role: String,
    pub content: String,
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChunkToolCall>,
}

impl Default for ChunkDelta {
    fn default() -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: String::new(),
            reasoning_content: String::new(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// One `chat.completion.chunk` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub model: String,
    pub object: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub citations: Vec<String>,
    pub created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ChunkError>,
}

impl ChatCompletionChunk {
    /// An empty assistant frame with a single choice.
    #[must_use]
    pub fn new(id: &str, model: &str, created: u64) -> Self {
        Self {
            id: id.to_owned(),
            model: model.to_owned(),
            object: CHUNK_OBJECT.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: None,
            }],
            citations: Vec::new(),
            created,
            usage: None,
            error: None,
        }
    }

    /// Mark this frame as carrying an upstream failure.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(ChunkError {
            message: message.into(),
            type_: SERVER_ERROR_TYPE.to_string(),
        });
        self
    }

    pub fn delta_mut(&mut self) -> &mut ChunkDelta {
        if self.choices.is_empty() {
            self.choices.push(ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: None,
            });
        }
        &mut self.choices[0].delta
    }

    pub fn set_finish_reason(&mut self, reason: FinishReason) {
        self.delta_mut();
        self.choices[0].finish_reason = Some(reason);
    }
}

/// Assistant message in a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChunkToolCall>,
}

impl Default for CompletionMessage {
    fn default() -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: String::new(),
            reasoning_content: String::new(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: Option<FinishReason>,
}

/// A `chat.completion` object assembled from a finished stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
