//! `{{ path }}` placeholder rendering over [`Value`] (spec §4.4 step 3).
//!
//! Placeholders are dotted paths resolved with [`Value::get_path`]; a
//! missing path renders as an empty string rather than failing the step.
//! Templates are applied recursively to every string leaf of a step's
//! `params` tree, leaving non-string leaves untouched.

use soar_contracts::value::Value;

/// Render every `{{ path }}` placeholder in `template` against `variables`.
pub fn render(template: &str, variables: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = after_open[..end].trim();
        let resolved = variables.get_path(path).map(ToString::to_string).unwrap_or_default();
        out.push_str(&resolved);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Recursively render every string leaf of `value` against `variables`;
/// non-string leaves and structure pass through unchanged.
pub fn render_value(value: &Value, variables: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, variables)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| render_value(item, variables)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Value {
        serde_json::json!({"severity": "high", "entityId": 7}).into()
    }

    #[test]
    fn renders_single_placeholder() {
        assert_eq!(render("sev={{severity}}", &vars()), "sev=high");
    }

    #[test]
    fn renders_multiple_placeholders() {
        assert_eq!(
            render("{{severity}} alert {{entityId}}", &vars()),
            "high alert 7"
        );
    }

    #[test]
    fn missing_path_renders_empty() {
        assert_eq!(render("value={{nope}}", &vars()), "value=");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        assert_eq!(render("{{ severity }}", &vars()), "high");
    }

    #[test]
    fn render_value_walks_nested_structure_and_preserves_non_strings() {
        let params: Value = serde_json::json!({
            "message": "sev={{severity}}",
            "retries": 3,
            "tags": ["{{severity}}", "static"]
        })
        .into();
        let rendered = render_value(&params, &vars());
        assert_eq!(rendered.get_path("message").and_then(Value::as_str), Some("sev=high"));
        assert_eq!(rendered.get_path("retries").and_then(Value::as_f64), Some(3.0));
        assert_eq!(rendered.get_path("tags.0").and_then(Value::as_str), Some("high"));
    }
}
