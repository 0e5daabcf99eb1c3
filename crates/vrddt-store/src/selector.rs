//! Field-equality selectors.

use std::collections::BTreeMap;
use std::fmt;

use vrddt_models::fields;

/// A conjunction of `field == value` constraints.
///
/// Field names are the records' wire names (see [`vrddt_models::fields`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    constraints: BTreeMap<String, String>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an equality constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(field.into(), value.into());
        self
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq(fields::ID, id)
    }

    pub fn by_url(url: impl Into<String>) -> Self {
        Self::new().eq(fields::URL, url)
    }

    /// Source records sharing an exact `(audio_url, video_url)` pair.
    pub fn by_streams(audio_url: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self::new()
            .eq(fields::AUDIO_URL, audio_url)
            .eq(fields::VIDEO_URL, video_url)
    }

    pub fn by_content_hash(hash: impl Into<String>) -> Self {
        Self::new().eq(fields::CONTENT_HASH, hash)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.constraints.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check a serialized record against every constraint.
    ///
    /// A missing or null field compares equal to the empty string.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        self.constraints.iter().all(|(field, expected)| {
            match record.get(field) {
                Some(serde_json::Value::String(actual)) => actual == expected,
                Some(serde_json::Value::Null) | None => expected.is_empty(),
                Some(other) => other.to_string() == *expected,
            }
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
