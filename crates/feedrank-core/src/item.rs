//! Feed items as handed over by an ingestion collaborator.
//!
//! An [`Item`] is an open mapping of named fields. The core only requires a
//! stable identifying field (configurable, `id` by default); every other
//! field is whatever the registered scoring functions choose to read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names tried, in order, by [`Item::text`].
pub const TEXT_FIELDS: [&str; 2] = ["text", "full_text"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    fields: Map<String, Value>,
}

impl Item {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    /// The item's body text, looked up under each of [`TEXT_FIELDS`].
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        TEXT_FIELDS.iter().find_map(|field| self.str_field(field))
    }

    /// Render `field` as an identifier string.
    ///
    /// Strings are returned as-is and numbers in their JSON form; any other
    /// value (or a missing field) yields `None`.
    #[must_use]
    pub fn identifier(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for Item {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_accepts_strings_and_numbers() {
        let item = Item::new()
            .with("id", "abc")
            .with("id_num", 1_234_567_890_u64)
            .with("flag", true);

        assert_eq!(item.identifier("id").as_deref(), Some("abc"));
        assert_eq!(item.identifier("id_num").as_deref(), Some("1234567890"));
        assert!(item.identifier("flag").is_none());
        assert!(item.identifier("missing").is_none());
    }

    #[test]
    fn text_falls_back_to_full_text() {
        let item = Item::new().with("full_text", "hello");
        assert_eq!(item.text(), Some("hello"));

        let both = Item::new().with("text", "short").with("full_text", "long");
        assert_eq!(both.text(), Some("short"));
    }

    #[test]
    fn deserializes_from_plain_object() {
        let item: Item =
            serde_json::from_value(json!({"id": "t1", "likes": 12.5})).expect("valid item");
        assert_eq!(item.f64_field("likes"), Some(12.5));
        assert_eq!(item.fields().len(), 2);
    }
}
