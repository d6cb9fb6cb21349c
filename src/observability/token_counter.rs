use crate::protocol::openai_chat::{OpenAiMessage, Usage};
use std::time::Duration;
use tracing::info;

/// Approximate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`, rounded up) so prompt and
/// completion accounting stay deterministic without a model vocabulary.
#[must_use]
pub fn approximate_token_count(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Concatenated text of every message; image and file parts are skipped.
#[must_use]
pub fn prompt_text(messages: &[OpenAiMessage]) -> String {
    messages.iter().map(OpenAiMessage::text).collect()
}

/// Usage for one stream: prompt from the request text, completion from the
/// transcript.
#[must_use]
pub fn stream_usage(prompt_text: &str, transcript: &str) -> Usage {
    Usage::new(
        approximate_token_count(prompt_text),
        approximate_token_count(transcript),
    )
}

/// Log token usage for a finished stream at INFO level.
pub fn log_stream_usage(model: &str, usage: &Usage, duration: Duration) {
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "stream completed"
    );
}
