//! Accumulation and emission engine.
//!
//! Every text or reasoning fragment is appended to one transcript. Without
//! declared tools each fragment goes out as its own delta frame. With tools,
//! the whole transcript is re-parsed into blocks after every fragment and at
//! most one newly completed block is emitted per fragment, in block order.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use super::sink::FrameSink;
use super::sse::{done_frame, openai_sse_frame};
use super::ChatConfig;
use crate::blocks::{Block, BlockParser};
use crate::observability::{log_stream_complete, token_counter::stream_usage};
use crate::protocol::openai_chat::{ChatCompletionChunk, ChunkToolCall, FinishReason};
use crate::util::{next_call_id, next_completion_id, unix_now_secs};

const THINKING_OPEN: &str = "<thinking>";
const THINKING_CLOSE: &str = "</thinking>";

type DoneCallback = Box<dyn FnOnce() + Send>;

pub struct EmissionEngine {
    config: Arc<ChatConfig>,
    parser: Arc<dyn BlockParser>,
    sink: FrameSink,
    id: String,
    prompt_text: String,
    transcript: String,
    /// Index of the next block to emit; everything before it has been sent.
    next_block: usize,
    citations: Vec<String>,
    citations_pending: bool,
    tool_calls_emitted: u32,
    callbacks: Vec<DoneCallback>,
    started_at: Instant,
    finished: bool,
}

impl EmissionEngine {
    /// `prompt_text` is the concatenated request text used for prompt usage.
    pub fn new(
        config: Arc<ChatConfig>,
        parser: Arc<dyn BlockParser>,
        sink: FrameSink,
        prompt_text: String,
    ) -> Self {
        Self {
            config,
            parser,
            sink,
            id: next_completion_id(),
            prompt_text,
            transcript: String::new(),
            next_block: 0,
            citations: Vec::new(),
            citations_pending: false,
            tool_calls_emitted: 0,
            callbacks: Vec::new(),
            started_at: Instant::now(),
            finished: false,
        }
    }

    /// Register a handler run once, after the sink closes.
    pub fn on_done(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Index of the last block fully emitted, `-1` before the first.
    #[must_use]
    pub fn sent_block_index(&self) -> isize {
        isize::try_from(self.next_block).map_or(isize::MAX, |n| n - 1)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push_content(&mut self, text: &str) {
        self.step(text, "", false);
    }

    pub fn push_reasoning(&mut self, text: &str) {
        self.step("", text, false);
    }

    /// Replace the citation set wholesale.
    pub fn replace_citations(&mut self, urls: Vec<String>) {
        self.citations = urls;
        self.step("", "", true);
    }

    /// Emit an in-band error frame, then terminate the stream.
    pub fn fail(&mut self, message: &str) {
        if self.finished {
            return;
        }
        error!(model = %self.config.model_name, error = message, "upstream failure");
        let frame = self.new_frame().with_error(message);
        self.emit(&frame);
        self.finish();
    }

    /// Terminate the stream: terminal frame with usage, `[DONE]`, close,
    /// callbacks. Runs once; later calls are no-ops.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut frame = self.new_frame();
        if self.config.has_tools() {
            if self.next_block == 0 {
                frame.delta_mut().content.clone_from(&self.transcript);
            } else {
                while self.emit_next_block() {}
                self.flush_trailing_block(&mut frame);
            }
        }

        let usage = stream_usage(&self.prompt_text, &self.transcript);
        frame.usage = Some(usage);
        frame.set_finish_reason(FinishReason::Stop);
        self.attach_pending_citations(&mut frame);
        self.emit(&frame);
        self.sink.send(done_frame());
        self.sink.close();

        log_stream_complete(&self.config.model_name, &usage, self.started_at);
        for callback in self.callbacks.drain(..) {
            callback();
        }
    }

    fn step(&mut self, content: &str, reasoning: &str, citations_changed: bool) {
        if self.finished {
            return;
        }
        self.transcript.push_str(reasoning);
        self.transcript.push_str(content);
        if citations_changed {
            self.citations_pending = true;
        }

        if !self.config.has_tools() {
            let mut frame = self.new_frame();
            let delta = frame.delta_mut();
            content.clone_into(&mut delta.content);
            reasoning.clone_into(&mut delta.reasoning_content);
            self.attach_pending_citations(&mut frame);
            self.emit(&frame);
            return;
        }

        self.emit_next_block();
    }

    /// Emit the block after the last one sent if it is complete.
    fn emit_next_block(&mut self) -> bool {
        let mut blocks = self.parser.parse(&self.transcript);
        if self.next_block >= blocks.len() {
            return false;
        }
        let block = blocks.swap_remove(self.next_block);
        if block.is_partial() {
            debug!(index = self.next_block, "block still partial; withholding");
            return false;
        }

        let mut frame = self.new_frame();
        match block {
            Block::Text { content, .. } => fill_text(&mut frame, &content),
            Block::ToolUse {
                tool_name,
                arguments,
                ..
            } => {
                let index = self.tool_calls_emitted;
                self.tool_calls_emitted += 1;
                frame.delta_mut().tool_calls.push(ChunkToolCall::function(
                    index,
                    next_call_id(),
                    tool_name,
                    arguments,
                ));
                frame.set_finish_reason(FinishReason::ToolCalls);
            }
        }
        self.attach_pending_citations(&mut frame);
        self.emit(&frame);
        debug!(index = self.next_block, "block emitted");
        self.next_block += 1;
        true
    }

    fn flush_trailing_block(&mut self, frame: &mut ChatCompletionChunk) {
        let mut blocks = self.parser.parse(&self.transcript);
        if self.next_block >= blocks.len() {
            return;
        }
        match blocks.swap_remove(self.next_block) {
            Block::Text { content, .. } => fill_text(frame, &content),
            Block::ToolUse { tool_name, .. } => {
                warn!(tool = %tool_name, "dropping unterminated tool call at end of stream");
            }
        }
    }

    fn attach_pending_citations(&mut self, frame: &mut ChatCompletionChunk) {
        if self.citations_pending {
            frame.citations.clone_from(&self.citations);
            self.citations_pending = false;
        }
    }

    fn new_frame(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::new(&self.id, &self.config.model_name, unix_now_secs())
    }

    fn emit(&self, frame: &ChatCompletionChunk) {
        match serde_json::to_string(frame) {
            Ok(json) => self.sink.send(openai_sse_frame(&json)),
            Err(e) => error!("failed to encode frame: {e}"),
        }
    }
}

/// Split `<thinking>...</thinking>` out of a text block.
fn fill_text(frame: &mut ChatCompletionChunk, text: &str) {
    let delta = frame.delta_mut();
    let split = text.find(THINKING_OPEN).and_then(|open| {
        let reasoning_start = open + THINKING_OPEN.len();
        let close = reasoning_start + text[reasoning_start..].find(THINKING_CLOSE)?;
        Some((reasoning_start, close))
    });
    match split {
        Some((reasoning_start, close)) => {
            text[close + THINKING_CLOSE.len()..].clone_into(&mut delta.content);
            text[reasoning_start..close].clone_into(&mut delta.reasoning_content);
        }
        None => {
            text.clone_into(&mut delta.content);
            delta.reasoning_content.clear();
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
