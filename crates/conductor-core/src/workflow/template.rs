//! `${input.key}` / `${steps.step_id.key}` template interpolation.
//!
//! Grounded on spec.md §4.4's AGENT_TASK rendering rule: deep JSON
//! traversal, missing keys leave the literal placeholder in place so
//! failures are visible rather than silently producing empty strings.

use serde_json::Value;

const PLACEHOLDER_PREFIX: &str = "${";
const PLACEHOLDER_SUFFIX: &str = "}";

/// Render every `${...}` placeholder found in `text` against `input` and
/// `steps` (the accumulated `step_results` map). A placeholder whose path
/// doesn't resolve to a value is left untouched, literal braces included.
pub fn render(text: &str, input: &Value, steps: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        out.push_str(&rest[..start]);
        let after_prefix = &rest[start + PLACEHOLDER_PREFIX.len()..];

        let Some(end) = after_prefix.find(PLACEHOLDER_SUFFIX) else {
            // Unterminated placeholder: emit the rest verbatim.
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let path = &after_prefix[..end];
        match resolve(path, input, steps) {
            Some(value) => out.push_str(&scalar_to_string(&value)),
            None => {
                out.push_str(PLACEHOLDER_PREFIX);
                out.push_str(path);
                out.push_str(PLACEHOLDER_SUFFIX);
            }
        }

        rest = &after_prefix[end + PLACEHOLDER_SUFFIX.len()..];
    }
    out.push_str(rest);
    out
}

/// Render every string leaf of a JSON document, recursively.
pub fn render_value(value: &Value, input: &Value, steps: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, input, steps)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, input, steps)).collect()),
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), render_value(v, input, steps))).collect(),
        ),
        other => other.clone(),
    }
}

fn resolve(path: &str, input: &Value, steps: &Value) -> Option<Value> {
    let mut parts = path.split('.');
    let root = parts.next()?;
    let root_value = match root {
        "input" => input,
        "steps" => steps,
        _ => return None,
    };

    let mut current = root_value;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current.clone())
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_input_path() {
        let input = json!({"name": "world"});
        let steps = json!({});
        assert_eq!(render("hello ${input.name}", &input, &steps), "hello world");
    }

    #[test]
    fn substitutes_nested_step_result() {
        let input = json!({});
        let steps = json!({"fetch": {"url": "https://example.com"}});
        assert_eq!(render("source: ${steps.fetch.url}", &input, &steps), "source: https://example.com");
    }

    #[test]
    fn missing_key_leaves_placeholder_literal() {
        let input = json!({});
        let steps = json!({});
        assert_eq!(render("value: ${input.missing}", &input, &steps), "value: ${input.missing}");
    }

    #[test]
    fn numeric_values_render_without_quotes() {
        let input = json!({"count": 3});
        let steps = json!({});
        assert_eq!(render("n=${input.count}", &input, &steps), "n=3");
    }

    #[test]
    fn render_value_recurses_into_objects() {
        let input = json!({"x": "1"});
        let steps = json!({});
        let template = json!({"a": "${input.x}", "b": ["${input.x}", "literal"]});
        let rendered = render_value(&template, &input, &steps);
        assert_eq!(rendered, json!({"a": "1", "b": ["1", "literal"]}));
    }
}
