pub mod parser;
pub mod prompt;

pub use parser::{parse_blocks, render_invocation, FunctionCallBlockParser};

/// One structural unit of the transcript.
///
/// `partial` means the block's terminating marker has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text {
        content: String,
        partial: bool,
    },
    ToolUse {
        tool_name: String,
        arguments: String,
        partial: bool,
    },
}

impl Block {
    #[must_use]
    pub fn is_partial(&self) -> bool {
        match self {
            Block::Text { partial, .. } | Block::ToolUse { partial, .. } => *partial,
        }
    }
}

/// Turns the whole transcript into an ordered block list.
///
/// Implementations must be pure: the same transcript always yields the same
/// blocks, and extending the transcript never reorders blocks that were
/// already complete.
pub trait BlockParser: Send + Sync {
    fn parse(&self, transcript: &str) -> Vec<Block>;
}

impl<F> BlockParser for F
where
    F: Fn(&str) -> Vec<Block> + Send + Sync,
{
    fn parse(&self, transcript: &str) -> Vec<Block> {
        self(transcript)
    }
}
