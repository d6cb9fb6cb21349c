//! Default transcript block parser.
//!
//! Tool invocations use the markup taught by [`super::prompt`]:
//!
//! ```text
//! <function_call>
//!   <tool>search</tool>
//!   <args_json><![CDATA[{"q":"rust"}]]></args_json>
//! </function_call>
//! ```
//!
//! Everything outside an invocation is text. An optional `<function_calls>`
//! wrapper is tolerated and removed from text blocks. Text that precedes an
//! invocation is complete as soon as the invocation opens; the trailing text
//! of the transcript is always partial because more of it may still arrive.
use std::borrow::Cow;
use std::sync::LazyLock;

use memchr::memmem;

use super::{Block, BlockParser};

const CALL_OPEN: &str = "<function_call>";
const CALL_CLOSE: &str = "</function_call>";
const WRAPPER_OPEN: &str = "<function_calls>";
const WRAPPER_CLOSE: &str = "</function_calls>";
const EMPTY_ARGUMENTS: &str = "{}";

static CALL_OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(CALL_OPEN.as_bytes()));
static CALL_CLOSE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(CALL_CLOSE.as_bytes()));

/// [`BlockParser`] for the `<function_call>` markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionCallBlockParser;

impl BlockParser for FunctionCallBlockParser {
    fn parse(&self, transcript: &str) -> Vec<Block> {
        parse_blocks(transcript)
    }
}

/// Split `transcript` into text and tool-use blocks.
#[must_use]
pub fn parse_blocks(transcript: &str) -> Vec<Block> {
    let bytes = transcript.as_bytes();
    let mut blocks = Vec::new();
    let mut cursor = 0usize;

    loop {
        let Some(open_rel) = CALL_OPEN_FINDER.find(&bytes[cursor..]) else {
            push_text(&mut blocks, &transcript[cursor..], true);
            break;
        };
        let open = cursor + open_rel;
        push_text(&mut blocks, &transcript[cursor..open], false);

        let body_start = open + CALL_OPEN.len();
        let Some(close_rel) = CALL_CLOSE_FINDER.find(&bytes[body_start..]) else {
            blocks.push(tool_use_from_body(&transcript[body_start..], true));
            break;
        };
        let body_end = body_start + close_rel;
        blocks.push(tool_use_from_body(&transcript[body_start..body_end], false));
        cursor = body_end + CALL_CLOSE.len();
    }

    blocks
}

/// Render one invocation in the markup [`parse_blocks`] understands.
#[must_use]
pub fn render_invocation(tool_name: &str, arguments: &str) -> String {
    let mut out = String::with_capacity(96 + tool_name.len() + arguments.len());
    out.push_str(CALL_OPEN);
    out.push_str("\n<tool>");
    out.push_str(tool_name);
    out.push_str("</tool>\n<args_json>");
    out.push_str(&wrap_cdata(arguments));
    out.push_str("</args_json>\n");
    out.push_str(CALL_CLOSE);
    out
}

fn push_text(blocks: &mut Vec<Block>, raw: &str, partial: bool) {
    let cleaned = strip_wrapper_tags(raw);
    let content = cleaned.trim();
    if content.is_empty() {
        return;
    }
    blocks.push(Block::Text {
        content: content.to_owned(),
        partial,
    });
}

fn strip_wrapper_tags(text: &str) -> Cow<'_, str> {
    if !text.contains(WRAPPER_OPEN) && !text.contains(WRAPPER_CLOSE) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace(WRAPPER_OPEN, "").replace(WRAPPER_CLOSE, ""))
}

fn tool_use_from_body(body: &str, partial: bool) -> Block {
    let tool_name = extract_tag_text(body, "<tool>", "</tool>")
        .map(str::trim)
        .unwrap_or_default()
        .to_owned();
    let arguments = extract_args_text(body)
        .map(decode_arguments)
        .filter(|args| !args.is_empty())
        .unwrap_or_else(|| EMPTY_ARGUMENTS.to_owned());
    Block::ToolUse {
        tool_name,
        arguments,
        partial,
    }
}

fn extract_args_text(body: &str) -> Option<&str> {
    extract_tag_text(body, "<args_json>", "</args_json>")
        .or_else(|| extract_tag_text(body, "<arguments>", "</arguments>"))
        .or_else(|| extract_tag_text(body, "<parameters>", "</parameters>"))
}

fn extract_tag_text<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let bytes = text.as_bytes();
    let start = memmem::find(bytes, open.as_bytes())?;
    let content_start = start + open.len();
    let end_rel = memmem::find(&bytes[content_start..], close.as_bytes())?;
    text.get(content_start..content_start + end_rel)
}

fn decode_arguments(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("<![CDATA[") {
        return unwrap_cdata(trimmed).trim().to_owned();
    }
    match quick_xml::escape::unescape(trimmed) {
        Ok(text) => text.into_owned(),
        Err(_) => trimmed.to_owned(),
    }
}

/// Concatenate the inner text of every CDATA section in `text`.
fn unwrap_cdata(text: &str) -> Cow<'_, str> {
    const CDATA_OPEN: &[u8] = b"<![CDATA[";
    const CDATA_CLOSE: &[u8] = b"]]>";

    let bytes = text.as_bytes();
    let mut out: Option<String> = None;
    let mut cursor = 0usize;

    while let Some(open_rel) = memmem::find(&bytes[cursor..], CDATA_OPEN) {
        let content_start = cursor + open_rel + CDATA_OPEN.len();
        let Some(close_rel) = memmem::find(&bytes[content_start..], CDATA_CLOSE) else {
            return Cow::Borrowed(text);
        };
        let content_end = content_start + close_rel;
        if let Some(part) = text.get(content_start..content_end) {
            out.get_or_insert_with(|| String::with_capacity(text.len()))
                .push_str(part);
        }
        cursor = content_end + CDATA_CLOSE.len();
    }

    out.map_or(Cow::Borrowed(text), Cow::Owned)
}

/// Wrap text in CDATA, splitting any `]]>` inside it.
fn wrap_cdata(text: &str) -> String {
    let safe = text.replace("]]>", "]]]]><![CDATA[>");
    format!("<![CDATA[{safe}]]>")
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
