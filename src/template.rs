use crate::response::Params;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

/// Reserved parameter key carrying the request body
pub const BODY_KEY: &str = "body";

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"<\w*>").unwrap();
}

/// Result of expanding a URL template
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// URL with every supplied placeholder substituted
    pub url: String,
    /// Value of the reserved `body` parameter, if present
    pub body: Option<Value>,
}

/// Substitute `<name>` placeholders in `template` with values from `params`.
///
/// Objects and arrays are substituted as JSON text, strings verbatim and
/// other scalars through their JSON rendering. Every occurrence of a
/// placeholder is replaced. Parameters without a matching placeholder are
/// ignored; `body` is never substituted and is returned separately.
pub fn expand(template: &str, params: &Params) -> Expansion {
    let mut url = template.to_string();
    let mut body = None;

    for (key, value) in params {
        if key == BODY_KEY {
            body = Some(value.clone());
            continue;
        }

        let placeholder = format!("<{key}>");
        if url.contains(&placeholder) {
            url = url.replace(&placeholder, &render(value));
        }
    }

    Expansion { url, body }
}

/// Placeholders still present in `url`, in order of appearance, brackets included
pub fn unresolved_placeholders(url: &str) -> Vec<String> {
    PLACEHOLDER
        .find_iter(url)
        .map(|m| m.as_str().to_string())
        .collect()
}


fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
