use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "yuanbao-bridge is running",
        "config": {
            "models_count": config.models.len(),
            "models": config.models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "features": {
                "log_level": config.features.log_level,
                "custom_tool_prompt": config.features.tool_prompt_template.is_some(),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_health_reports_models() {
        let config = parse_config(
            r"
upstream:
  chat_url: https://example.com/api/chat/abc
models:
  - id: deepseek-r1
    chat_model_id: deep_seek
  - id: hunyuan-t1
    chat_model_id: hunyuan_t1
",
        )
        .unwrap();
        let state = Arc::new(AppState::new(config).unwrap());
        let Json(body) = health_handler(State(state));
        assert_eq!(body["status"], "yuanbao-bridge is running");
        assert_eq!(body["config"]["models_count"], 2);
        assert_eq!(body["config"]["models"][1], "hunyuan-t1");
        assert_eq!(body["config"]["features"]["log_level"], "INFO");
    }
}
