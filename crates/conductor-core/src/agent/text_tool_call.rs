//! Fallback parser for tool calls embedded as text in a model's response,
//! for providers/models that don't emit structured tool-call fields.
//!
//! Gated per [`conductor_db::models::AgentDefinition::allow_text_tool_call_fallback`];
//! disabled by default. When it fires, the agent runtime logs it and emits
//! an `agent.thinking` event with `metadata.text_tool_call_fallback = true`
//! so operators can see how often a model is bypassing structured calling.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::llm::ToolCallRequest;

static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[^{}]*"name"\s*:\s*"([^"]+)"[^{}]*\}"#).unwrap());

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*(\{[^`]*\})\s*```").unwrap()
});

/// Scan `content` for an embedded tool-call object, accepting it only if
/// its `name` field is in `available_tools`.
///
/// Tries, in order: a JSON object in a fenced code block, then a bare JSON
/// object anywhere in the text. `arguments` falls back to `parameters` if
/// present (some models emit the latter key instead).
pub fn parse_text_tool_call(content: &str, available_tools: &[String]) -> Option<ToolCallRequest> {
    let candidate = FENCED_BLOCK
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| BARE_OBJECT.find(content).map(|m| m.as_str().to_string()))?;

    let parsed: Value = serde_json::from_str(&candidate).ok()?;
    let name = parsed.get("name")?.as_str()?.to_string();

    if !available_tools.iter().any(|t| t == &name) {
        return None;
    }

    let arguments = parsed
        .get("arguments")
        .or_else(|| parsed.get("parameters"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    Some(ToolCallRequest { name, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<String> {
        vec!["search".to_string(), "final_answer".to_string()]
    }

    #[test]
    fn parses_bare_json_object() {
        let content = r#"I should call {"name": "search", "arguments": {"q": "rust"}} now."#;
        let call = parse_text_tool_call(content, &tools()).unwrap();
        assert_eq!(call.name, "search");
        assert_eq!(call.arguments, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn parses_fenced_json_block() {
        let content = "Here:\n```json\n{\"name\": \"search\", \"parameters\": {\"q\": \"foo\"}}\n```";
        let call = parse_text_tool_call(content, &tools()).unwrap();
        assert_eq!(call.name, "search");
        assert_eq!(call.arguments, serde_json::json!({"q": "foo"}));
    }

    #[test]
    fn rejects_name_not_in_available_tools() {
        let content = r#"{"name": "delete_everything", "arguments": {}}"#;
        assert!(parse_text_tool_call(content, &tools()).is_none());
    }

    #[test]
    fn returns_none_for_plain_prose() {
        let content = "The answer is 42, no tool needed.";
        assert!(parse_text_tool_call(content, &tools()).is_none());
    }

    #[test]
    fn arguments_falls_back_to_empty_object() {
        let content = r#"{"name": "final_answer"}"#;
        let call = parse_text_tool_call(content, &tools()).unwrap();
        assert_eq!(call.arguments, serde_json::json!({}));
    }
}
