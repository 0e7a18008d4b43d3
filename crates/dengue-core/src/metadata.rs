// Metadata bag shared between agents within a run
//
// Agents exchange structured results through a growing key/value map. Merging is
// shallow and right-biased: later writes win, nothing is ever removed by a merge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known metadata keys written or read by the interpreter and built-in agents
pub mod keys {
    pub const WORKFLOW_ID: &str = "workflow_id";
    pub const BLOCKED: &str = "blocked";
    pub const TIMESTAMP: &str = "timestamp";

    pub const QUERY: &str = "query";
    pub const ORIGINAL_QUERY: &str = "original_query";
    pub const QUERY_REWRITE_ATTEMPTED: &str = "query_rewrite_attempted";
    pub const REWRITE_COUNT: &str = "rewrite_count";

    pub const SAFETY_CHECKED: &str = "safety_checked";
    pub const SAFETY_AGENT_ID: &str = "safety_agent_id";
    pub const SAFETY_CHECK_PASSED: &str = "safety_check_passed";

    pub const CYPHER_QUERY: &str = "cypher_query";
    pub const PATTERN_NAME: &str = "pattern_name";
    pub const EXTRACTED_COUNTRIES: &str = "extracted_countries";
    pub const RESULTS: &str = "results";
    pub const RESULT_COUNT: &str = "result_count";
    pub const ASSESSMENT: &str = "assessment";
    pub const ERROR: &str = "error";
}

/// String-keyed JSON map. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove a key. Used only for routing keys consumed before a run starts.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Shallow right-biased merge: every key of `other` overwrites the same key here
    pub fn merge(&mut self, other: &Metadata) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Truthiness of a value: false for missing, null, false, zero, and empty
    /// strings, arrays or objects
    pub fn is_truthy(&self, key: &str) -> bool {
        self.0.get(key).map(value_is_truthy).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

pub(crate) fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Value> for Metadata {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_right_biased_and_keeps_keys() {
        let mut base = Metadata::new().with("a", 1).with("b", "keep");
        let update = Metadata::new().with("a", 2).with("c", true);

        base.merge(&update);

        assert_eq!(base.get("a"), Some(&json!(2)));
        assert_eq!(base.get("b"), Some(&json!("keep")));
        assert_eq!(base.get("c"), Some(&json!(true)));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut base = Metadata::new().with("nested", json!({"x": 1, "y": 2}));
        base.merge(&Metadata::new().with("nested", json!({"x": 5})));
        assert_eq!(base.get("nested"), Some(&json!({"x": 5})));
    }

    #[test]
    fn test_truthiness() {
        let meta = Metadata::new()
            .with("t", true)
            .with("f", false)
            .with("zero", 0)
            .with("one", 1)
            .with("empty", "")
            .with("text", "yes")
            .with("list", json!([]))
            .with("null", Value::Null);

        assert!(meta.is_truthy("t"));
        assert!(meta.is_truthy("one"));
        assert!(meta.is_truthy("text"));
        assert!(!meta.is_truthy("f"));
        assert!(!meta.is_truthy("zero"));
        assert!(!meta.is_truthy("empty"));
        assert!(!meta.is_truthy("list"));
        assert!(!meta.is_truthy("null"));
        assert!(!meta.is_truthy("missing"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let meta = Metadata::new().with("k", "v");
        assert_eq!(serde_json::to_value(&meta).unwrap(), json!({"k": "v"}));

        let parsed: Metadata = serde_json::from_value(json!({"n": 3})).unwrap();
        assert_eq!(parsed.get("n"), Some(&json!(3)));
    }
}
