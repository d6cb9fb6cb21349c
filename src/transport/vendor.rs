use serde_json::{json, Map, Value};

use crate::config::ModelConfig;
use crate::stream::ChatConfig;

const VENDOR_MODEL: &str = "gpt_175B_0404";
const OPEN_SEARCH: &str = "openInternetSearch";
const CLOSE_SEARCH: &str = "closeInternetSearch";

/// Build the JSON body of one vendor chat request.
///
/// Deep search only opens the search function; vendor switches beyond that
/// belong in the model's `extra_body`, which is merged last and wins on
/// conflicts.
#[must_use]
pub fn build_vendor_body(
    chat: &ChatConfig,
    model: &ModelConfig,
    prompt: &str,
    images: &[String],
    agent_id: &str,
) -> Value {
    let search = if chat.features.searching || chat.features.deep_searching {
        OPEN_SEARCH
    } else {
        CLOSE_SEARCH
    };
    let multimedia: Vec<Value> = images
        .iter()
        .map(|url| json!({"type": "image", "url": url}))
        .collect();

    let mut body = json!({
        "model": VENDOR_MODEL,
        "prompt": prompt,
        "plugin": "Adaptive",
        "displayPrompt": prompt,
        "displayPromptType": 1,
        "multimedia": multimedia,
        "agentId": agent_id,
        "supportHint": 1,
        "version": "v2",
        "chatModelId": chat.chat_model_id,
        "supportFunctions": [search],
    });
    merge_extra(&mut body, &model.extra_body);
    body
}

fn merge_extra(body: &mut Value, extra: &Map<String, Value>) {
    if let Value::Object(target) = body {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
}
