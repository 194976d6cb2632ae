use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A submitted field: a single value or a repeated one (checkbox groups).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

/// Submitted form fields keyed by name, e.g. `answer_<row id>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// First value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Integer value of a field; missing or malformed input is 0.
    pub fn int_or_zero(&self, name: &str) -> i32 {
        self.get(name)
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map(|v| v.max(0))
            .unwrap_or(0)
    }

    /// Every value of a field that parses as an id; the rest are dropped.
    pub fn ids(&self, name: &str) -> Vec<Uuid> {
        self.get_all(name)
            .iter()
            .filter_map(|v| Uuid::parse_str(v.trim()).ok())
            .collect()
    }

    pub fn is_checked(&self, name: &str) -> bool {
        self.get(name) == Some("on")
    }
}

impl From<HashMap<String, FieldValue>> for FormData {
    fn from(raw: HashMap<String, FieldValue>) -> Self {
        let fields = raw
            .into_iter()
            .map(|(name, value)| match value {
                FieldValue::One(v) => (name, vec![v]),
                FieldValue::Many(vs) => (name, vs),
            })
            .collect();
        Self { fields }
    }
}

pub fn watched_key(user_video_id: Uuid) -> String {
    format!("watched_{}", user_video_id)
}

pub fn answer_key(row_id: Uuid) -> String {
    format!("answer_{}", row_id)
}

pub fn question_key(question_id: Uuid) -> String {
    format!("question_{}", question_id)
}

pub fn selected_right_key(user_matching_id: Uuid) -> String {
    format!("selected_right_{}", user_matching_id)
}

pub fn cell_key(row_id: Uuid, column_id: Uuid) -> String {
    format!("cell_{}_{}", row_id, column_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_numbers_default_to_zero() {
        let form = FormData::new()
            .with("watched_a", "abc")
            .with("watched_b", "-12")
            .with("watched_c", " 42 ");
        assert_eq!(form.int_or_zero("watched_a"), 0);
        assert_eq!(form.int_or_zero("watched_b"), 0);
        assert_eq!(form.int_or_zero("watched_c"), 42);
        assert_eq!(form.int_or_zero("missing"), 0);
    }

    #[test]
    fn ids_skip_unparseable_values() {
        let id = Uuid::new_v4();
        let form = FormData::new()
            .with("question_x", id.to_string())
            .with("question_x", "not-an-id");
        assert_eq!(form.ids("question_x"), vec![id]);
    }

    #[test]
    fn converts_json_fields() {
        let raw: HashMap<String, FieldValue> = serde_json::from_value(serde_json::json!({
            "answer_1": "hello",
            "question_2": ["a", "b"],
        }))
        .unwrap();
        let form = FormData::from(raw);
        assert_eq!(form.get("answer_1"), Some("hello"));
        assert_eq!(form.get_all("question_2"), &["a".to_string(), "b".to_string()]);
        assert!(!form.is_checked("answer_1"));
    }
}
