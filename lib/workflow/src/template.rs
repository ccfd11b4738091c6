//! `{field.path}` placeholder substitution for action parameters.

use crate::event::lookup_path;
use serde_json::Value as JsonValue;

/// A rendered template and the placeholders that had no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub unresolved: Vec<String>,
}

/// Substitute every `{path}` in `template` from `payload`.
///
/// Strings are inserted as-is, other scalars in their JSON text form and
/// lists or objects as compact JSON. Unresolved placeholders become empty
/// strings. Text without a closing brace is copied through unchanged.
#[must_use]
pub fn render(template: &str, payload: &JsonValue) -> Rendered {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            text.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let inner = &after[..close];
        if inner.is_empty() || inner.contains('{') {
            text.push('{');
            rest = after;
            continue;
        }
        let path = inner.trim();
        match lookup_path(payload, path) {
            Some(JsonValue::String(s)) => text.push_str(s),
            Some(value) => text.push_str(&value.to_string()),
            None => unresolved.push(path.to_string()),
        }
        rest = &after[close + 1..];
    }
    text.push_str(rest);

    Rendered { text, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_nested_fields() {
        let payload = json!({
            "pull_request": { "title": "Add docs", "number": 9 },
            "files": ["a.md"]
        });
        let rendered = render(
            "PR #{pull_request.number}: {pull_request.title} {files}",
            &payload,
        );
        assert_eq!(rendered.text, r#"PR #9: Add docs ["a.md"]"#);
        assert!(rendered.unresolved.is_empty());
    }

    #[test]
    fn unresolved_placeholders_become_empty() {
        let rendered = render("Hello {user.name}!", &json!({}));
        assert_eq!(rendered.text, "Hello !");
        assert_eq!(rendered.unresolved, vec!["user.name".to_string()]);
    }

    #[test]
    fn stray_braces_pass_through() {
        let payload = json!({ "a": 1 });
        assert_eq!(render("{} and {a}", &payload).text, "{} and 1");
        assert_eq!(render("open { brace", &payload).text, "open { brace");
        assert_eq!(render("{{a}}", &payload).text, "{1}");
    }
}
