use std::sync::LazyLock;

use serde_json::Value;

use super::parser::render_invocation;
use crate::protocol::openai_chat::{OpenAiTool, ToolChoice};

static DEFAULT_PROMPT_TEMPLATE: LazyLock<String> = LazyLock::new(default_prompt_template);

// ---------------------------------------------------------------------------
// Tool list formatting
// ---------------------------------------------------------------------------

fn format_param_detail(p_name: &str, p_info: &Value, required_list: &[&str]) -> Vec<String> {
    let is_required = if required_list.contains(&p_name) {
        "Yes"
    } else {
        "No"
    };
    let p_type = p_info.get("type").and_then(Value::as_str).unwrap_or("any");

    let mut lines = vec![
        format!("- {p_name}:"),
        format!("  - type: {p_type}"),
        format!("  - required: {is_required}"),
    ];
    if let Some(desc) = p_info.get("description").and_then(Value::as_str) {
        lines.push(format!("  - description: {desc}"));
    }
    if let Some(values) = p_info.get("enum") {
        lines.push(format!("  - enum: {values}"));
    }
    if let Some(default) = p_info.get("default") {
        lines.push(format!("  - default: {default}"));
    }
    if p_type == "array" {
        if let Some(item_type) = p_info.pointer("/items/type") {
            lines.push(format!("  - items.type: {item_type}"));
        }
    }
    lines
}

fn format_tool(idx: usize, tool: &OpenAiTool) -> String {
    let func = &tool.function;
    let name = &func.name;
    let schema = func.parameters.as_ref();
    let props = schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object);
    let required_list: Vec<&str> = schema
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let params_summary = match props {
        Some(props) if !props.is_empty() => props
            .iter()
            .map(|(p_name, p_info)| {
                let p_type = p_info.get("type").and_then(Value::as_str).unwrap_or("any");
                format!("{p_name} ({p_type})")
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => "None".to_string(),
    };

    let detail_lines: Vec<String> = props
        .into_iter()
        .flat_map(|m| m.iter())
        .flat_map(|(p_name, p_info)| format_param_detail(p_name, p_info, &required_list))
        .collect();
    let detail_block = if detail_lines.is_empty() {
        "(no parameter details)".to_string()
    } else {
        detail_lines.join("\n")
    };

    let desc_block = match func.description.as_deref() {
        Some(desc) if !desc.is_empty() => format!("```\n{desc}\n```"),
        _ => "None".to_string(),
    };
    let required_str = if required_list.is_empty() {
        "None".to_string()
    } else {
        required_list.join(", ")
    };

    format!(
        "{idx}. <tool name=\"{name}\">\n\
         \x20\x20\x20Description:\n\
         {desc_block}\n\
         \x20\x20\x20Parameters summary: {params_summary}\n\
         \x20\x20\x20Required parameters: {required_str}\n\
         \x20\x20\x20Parameter details:\n\
         {detail_block}"
    )
}

fn format_tools_list(tools: &[OpenAiTool]) -> String {
    tools
        .iter()
        .enumerate()
        .map(|(i, tool)| format_tool(i + 1, tool))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn call_format_example() -> String {
    format!(
        "{}\n{}",
        render_invocation("search", r#"{"keywords": ["rust streams"]}"#),
        render_invocation("Grep", r#"{"-i": true, "path": "."}"#)
    )
}

// ---------------------------------------------------------------------------
// Default template
// ---------------------------------------------------------------------------

fn default_prompt_template() -> String {
    r"
You have access to the following tools:

{tools_list}

When you decide to use a tool, write one <function_call> block per call, exactly in this format:

{call_format}

Rules:
1. The <tool> tag must contain the exact name of a tool from the list above.
2. The <args_json> tag must contain a single JSON object with every required argument. Use parameter keys exactly as defined.
3. Wrap the JSON inside <![CDATA[...]]> so it needs no XML escaping.
4. You may write normal text before a call. Do not write anything after your last </function_call> tag.
5. Results of earlier calls appear in the conversation as <tool_result> blocks. Read them before calling the same tool again.
"
    .to_string()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render the tool-use preamble that is prepended to the vendor prompt.
///
/// `template` overrides the built-in text; it may reference `{tools_list}`
/// and `{call_format}`. The tool choice adds a trailing constraint line.
#[must_use]
pub fn render_tool_prompt(
    tools: &[OpenAiTool],
    tool_choice: &ToolChoice,
    template: Option<&str>,
) -> String {
    let tools_list = format_tools_list(tools);
    let template = template.unwrap_or(DEFAULT_PROMPT_TEMPLATE.as_str());
    let prompt = template
        .replace("{call_format}", &call_format_example())
        .replace("{tools_list}", &tools_list);

    match tool_choice {
        ToolChoice::Auto => prompt,
        ToolChoice::None => format!("{prompt}\nDo NOT call any tool in this reply."),
        ToolChoice::Required => format!("{prompt}\nYou MUST call at least one tool."),
        ToolChoice::Specific(name) => {
            format!("{prompt}\nYou MUST call the tool `{name}` and no other tool.")
        }
    }
}
