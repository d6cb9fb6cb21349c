//! YuanBao streaming chunk model.
//!
//! Every `data:` line of the vendor stream is a JSON object tagged by a
//! `type` field. Lines that start with `[` or a lowercase ASCII letter are
//! vendor keep-alive / bookkeeping markers (`[plugin: ]`, `[MSGINDEX:1]`,
//! `[DONE]`, ...) and never carry chunk data.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::BridgeError;

/// Semantic kind of a vendor chunk, as seen by the emission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Thinking,
    SearchingDone,
    Start,
    /// Needs the specialized renderer.
    None,
}

/// Missing and `null` fields both decode to the type's default; the vendor
/// sends either for "no value".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub msg: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThinkChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchDoc {
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub docs: Vec<SearchDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutlineChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub outline_list: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Multimedia {
    #[serde(deserialize_with = "null_as_default")]
    pub media_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplaceBody {
    #[serde(deserialize_with = "null_as_default")]
    pub multimedias: Vec<Multimedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplaceChunk {
    pub replace: Option<ReplaceBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DividerChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub divider_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelevantEntity {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub desc: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelevantEntitiesChunk {
    #[serde(deserialize_with = "null_as_default")]
    pub entity_list: Vec<RelevantEntity>,
}

/// One decoded vendor chunk.
#[derive(Debug, Clone)]
pub enum VendorChunk {
    Text(TextChunk),
    Think(ThinkChunk),
    SearchGuid(SearchChunk),
    Meta,
    Outline(OutlineChunk),
    Replace(ReplaceChunk),
    DividerLine(DividerChunk),
    RelevantEntities(RelevantEntitiesChunk),
    Components,
    Mindmap,
    Step,
    Unknown { kind: String, payload: Value },
}

impl VendorChunk {
    /// Decode one JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::VendorPayload`] when the payload is not valid JSON
    /// or a known chunk kind has fields of the wrong shape.
    pub fn from_json(data: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(data)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let chunk = match kind.as_str() {
            "text" => VendorChunk::Text(serde_json::from_value(value)?),
            "think" => VendorChunk::Think(serde_json::from_value(value)?),
            "searchGuid" => VendorChunk::SearchGuid(serde_json::from_value(value)?),
            "meta" => VendorChunk::Meta,
            "outline" => VendorChunk::Outline(serde_json::from_value(value)?),
            "replace" => VendorChunk::Replace(serde_json::from_value(value)?),
            "dividerLine" => VendorChunk::DividerLine(serde_json::from_value(value)?),
            "relevantEntities" => VendorChunk::RelevantEntities(serde_json::from_value(value)?),
            "components" => VendorChunk::Components,
            "mindmap" => VendorChunk::Mindmap,
            "step" => VendorChunk::Step,
            _ => VendorChunk::Unknown {
                kind,
                payload: value,
            },
        };
        Ok(chunk)
    }

    #[must_use]
    pub fn kind(&self) -> ChunkKind {
        classify(self)
    }
}

/// Map a chunk to the semantic kind the engine dispatches on.
#[must_use]
pub fn classify(chunk: &VendorChunk) -> ChunkKind {
    match chunk {
        VendorChunk::Text(_) => ChunkKind::Text,
        VendorChunk::Think(_) => ChunkKind::Thinking,
        VendorChunk::SearchGuid(_) => ChunkKind::SearchingDone,
        VendorChunk::Meta => ChunkKind::Start,
        VendorChunk::Outline(_)
        | VendorChunk::Replace(_)
        | VendorChunk::DividerLine(_)
        | VendorChunk::RelevantEntities(_)
        | VendorChunk::Components
        | VendorChunk::Mindmap
        | VendorChunk::Step
        | VendorChunk::Unknown { .. } => ChunkKind::None,
    }
}

/// Vendor bookkeeping line that is not a JSON chunk.
#[must_use]
pub fn is_keep_alive(data: &str) -> bool {
    matches!(data.as_bytes().first(), Some(b'[' | b'a'..=b'z'))
}

/// Decode the `data` field of one vendor SSE event.
///
/// Returns `Ok(None)` for empty data and keep-alive markers.
///
/// # Errors
///
/// Propagates [`VendorChunk::from_json`] failures.
pub fn decode_event_data(data: &str) -> Result<Option<VendorChunk>, BridgeError> {
    if data.is_empty() || is_keep_alive(data) {
        return Ok(None);
    }
    VendorChunk::from_json(data).map(Some)
}
