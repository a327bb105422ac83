use serde_json::Value;

/// Params is the parameter object passed to generated methods.
///
/// Keys are matched against `<name>` placeholders in the URL template; the
/// reserved `body` key carries the request body.
pub type Params = serde_json::Map<String, Value>;

/// Parse a response body as JSON, passing the raw text through when it is not
/// valid JSON.
///
/// A call never fails merely because the server answered with plain text.
pub fn parse_lenient(text: &str) -> Value {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => Value::String(text.to_string()),
    }
}

/// Get a value by a slash-separated path.
/// For example, "data/items" would access the "items" field inside the "data" object.
/// An empty path returns the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('/').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                arr.get(index)?
            }
            _ => return None,
        };
    }

    Some(current)
}

/// Application-level status code carried in a response body, if any
pub fn status_code(value: &Value) -> Option<i64> {
    match value.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
