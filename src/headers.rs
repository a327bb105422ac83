//! Request header bookkeeping.
//!
//! Headers are kept in registration order. Names are compared
//! case-insensitively, so a registry never holds two entries for the same
//! header. Values are either literals or producers evaluated at send time,
//! which is how rotating auth tokens are supplied.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;

const CONTENT_TYPE: &str = "content-type";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const JSON: &str = "application/json";

/// A header value: either a fixed string or a producer called on every send.
#[derive(Clone)]
pub enum HeaderValue {
    Literal(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl HeaderValue {
    /// Create a value computed at send time
    pub fn computed<F>(producer: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        HeaderValue::Computed(Arc::new(producer))
    }

    /// Evaluate the value
    pub fn resolve(&self) -> String {
        match self {
            HeaderValue::Literal(value) => value.clone(),
            HeaderValue::Computed(producer) => producer(),
        }
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            HeaderValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Literal(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Literal(value)
    }
}

impl<'de> Deserialize<'de> for HeaderValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(HeaderValue::Literal)
    }
}

/// How a request body is serialized on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    #[default]
    Json,
    Form,
}

impl BodyEncoding {
    /// Encoding implied by a header, if it is a content-type declaration
    /// this client understands
    pub fn from_header(name: &str, value: &str) -> Option<Self> {
        if !name.eq_ignore_ascii_case(CONTENT_TYPE) {
            return None;
        }
        let value = value.trim().to_ascii_lowercase();
        if value.starts_with(FORM_URLENCODED) {
            Some(BodyEncoding::Form)
        } else if value.starts_with(JSON) {
            Some(BodyEncoding::Json)
        } else {
            None
        }
    }

    /// Content type sent when the caller did not declare one
    pub fn content_type(self) -> &'static str {
        match self {
            BodyEncoding::Json => JSON,
            BodyEncoding::Form => FORM_URLENCODED,
        }
    }
}

#[derive(Clone, Debug)]
struct HeaderEntry {
    name: String,
    value: HeaderValue,
}

/// Ordered set of request headers, unique by (case-insensitive) name.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "IndexMap<String, HeaderValue>")]
pub struct HeaderRegistry {
    entries: IndexMap<String, HeaderEntry>,
}

impl HeaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every header with the given ones
    pub fn set_all<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        self.entries.clear();
        for (name, value) in headers {
            self.upsert(name, value);
        }
    }

    /// Replace the value of an existing header in place, or append a new one
    pub fn upsert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(entry) => entry.value = value,
            None => {
                self.entries
                    .insert(name.to_ascii_lowercase(), HeaderEntry { name, value });
            }
        }
    }

    /// Builder form of [`upsert`](Self::upsert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.upsert(name, value);
        self
    }

    /// Remove a header; absent names are ignored
    pub fn remove(&mut self, name: &str) {
        self.entries.shift_remove(&name.to_ascii_lowercase());
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| &entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over header names and values in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries
            .values()
            .map(|entry| (entry.name.as_str(), &entry.value))
    }

    /// Evaluate every header, computed ones included
    pub fn resolve(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.resolve()))
            .collect()
    }

    /// Apply these headers and then `local` on top of them.
    ///
    /// Local headers override global ones with the same name. The body
    /// encoding follows the last content-type declaration seen, so an explicit
    /// JSON content type cancels an earlier form-encoded one.
    pub fn merge(&self, local: &HeaderRegistry) -> (Vec<(String, String)>, BodyEncoding) {
        let mut merged: IndexMap<String, (String, String)> = IndexMap::new();
        let mut encoding = BodyEncoding::default();

        for (name, value) in self.iter().chain(local.iter()) {
            let value = value.resolve();
            if let Some(declared) = BodyEncoding::from_header(name, &value) {
                encoding = declared;
            }
            match merged.get_mut(&name.to_ascii_lowercase()) {
                Some(slot) => slot.1 = value,
                None => {
                    merged.insert(name.to_ascii_lowercase(), (name.to_string(), value));
                }
            }
        }

        (merged.into_values().collect(), encoding)
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderRegistry
where
    K: Into<String>,
    V: Into<HeaderValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut registry = HeaderRegistry::new();
        registry.set_all(iter);
        registry
    }
}

impl From<IndexMap<String, HeaderValue>> for HeaderRegistry {
    fn from(map: IndexMap<String, HeaderValue>) -> Self {
        map.into_iter().collect()
    }
}
