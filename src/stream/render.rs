//! Markdown rendering for structural vendor chunks.
//!
//! Structural chunks carry no text delta of their own; the bridge turns the
//! ones a reader cares about into Markdown appended as ordinary content.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use crate::protocol::vendor::{
    DividerChunk, OutlineChunk, RelevantEntitiesChunk, ReplaceChunk, VendorChunk,
};

const OUTLINE_HEADING: &str = "# 研究大纲";
const ENTITIES_HEADING: &str = "# 相关组织及人物";
const IMAGE_MEDIA_TYPE: &str = "image";

static REF_LINK: LazyLock<Result<Regex, regex_lite::Error>> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:,\d+)*)\]\(@ref\)"));

/// Render a structural chunk, or `None` when it contributes nothing.
#[must_use]
pub fn render_chunk(chunk: &VendorChunk) -> Option<String> {
    match chunk {
        VendorChunk::Outline(outline) => Some(render_outline(outline)),
        VendorChunk::Replace(replace) => render_replace(replace),
        VendorChunk::DividerLine(divider) => Some(render_divider(divider)),
        VendorChunk::RelevantEntities(entities) => Some(render_entities(entities)),
        VendorChunk::Components
        | VendorChunk::Mindmap
        | VendorChunk::Meta
        | VendorChunk::Step => None,
        VendorChunk::Unknown { kind, payload } => {
            tracing::warn!(kind = %kind, payload = %payload, "unrecognized vendor chunk kind");
            None
        }
        // Delta kinds are folded in by the engine, never rendered.
        VendorChunk::Text(_) | VendorChunk::Think(_) | VendorChunk::SearchGuid(_) => None,
    }
}

/// Rewrite `[1,2](@ref)` citation markers into `[1][2]`.
#[must_use]
pub fn format_link(text: &str) -> String {
    let re = match REF_LINK.as_ref() {
        Ok(re) => re,
        Err(err) => {
            tracing::error!(error = %err, "citation marker pattern failed to compile");
            return text.to_owned();
        }
    };
    re.replace_all(text, |caps: &Captures<'_>| {
        caps[1].split(',').fold(String::new(), |mut out, n| {
            let _ = write!(out, "[{n}]");
            out
        })
    })
    .into_owned()
}

/// The heading is emitted even for an empty list; `null` items are skipped.
fn render_outline(outline: &OutlineChunk) -> String {
    outline
        .outline_list
        .iter()
        .flatten()
        .fold(OUTLINE_HEADING.to_string(), |mut out, item| {
            let _ = write!(out, "\n- {item}");
            out
        })
}

fn render_replace(replace: &ReplaceChunk) -> Option<String> {
    let images: Vec<String> = replace
        .replace
        .iter()
        .flat_map(|body| body.multimedias.iter())
        .filter(|media| media.media_type == IMAGE_MEDIA_TYPE && !media.url.is_empty())
        .map(|media| format!("![image]({})", media.url))
        .collect();
    if images.is_empty() {
        return None;
    }
    Some(format!("\n{}\n", images.join("\n")))
}

fn render_divider(divider: &DividerChunk) -> String {
    format!("\n# {}\n", divider.divider_text)
}

fn render_entities(entities: &RelevantEntitiesChunk) -> String {
    let rows: Vec<[String; 2]> = entities
        .entity_list
        .iter()
        .map(|entity| [format_link(&entity.name), format_link(&entity.desc)])
        .collect();
    format!(
        "\n{ENTITIES_HEADING}\n{}",
        markdown_table(&["name", "desc"], &rows)
    )
}

fn markdown_table<const N: usize>(headers: &[&str; N], rows: &[[String; N]]) -> String {
    let separators: Vec<String> = headers.iter().map(|h| "-".repeat(h.len().max(3))).collect();
    let mut out = String::new();
    push_row(&mut out, headers.iter().copied());
    push_row(&mut out, separators.iter().map(String::as_str));
    for row in rows {
        push_row(&mut out, row.iter().map(String::as_str));
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}
