// src/properties/mod.rs

//! Property sets - the canonical unit of configuration state
//!
//! Every source, once adapted, ends up as a [`PropertySet`]: an ordered
//! key/value map. Two key families are reserved throughout the pipeline:
//!
//! - **Info keys** (`conflux.info.*`): volatile provenance metadata such as
//!   timestamps and the name of the adapter that produced the set. They are
//!   carried along but never take part in equality checks.
//! - **Service keys** (`service.pid`, `service.factoryPid`): the identity of
//!   the configuration, always taken from the routing metadata.

pub mod keys;

pub use keys::{KeySpec, copy, equal, equal_ignoring};

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

/// Key holding the persistent id of a configuration
pub const SERVICE_PID: &str = "service.pid";

/// Key holding the factory pid of a factory configuration
pub const SERVICE_FACTORYPID: &str = "service.factoryPid";

/// Prefix shared by all volatile provenance keys
pub const INFO_PREFIX: &str = "conflux.info.";

/// When the adapted set was produced (RFC 3339)
pub const INFO_TIMESTAMP: &str = "conflux.info.timestamp";

/// Name of the adapter that produced the set
pub const INFO_ADAPTER: &str = "conflux.info.adapter";

/// Factory instance name, used to find an existing factory configuration
pub const INFO_FACTORY_INSTANCE: &str = "conflux.info.factory.instance";

/// A single property value
pub type PropertyValue = serde_json::Value;

/// Ordered key/value mapping used for both configuration content and
/// routing metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySet(BTreeMap<String, PropertyValue>);

impl PropertySet {
    /// Create an empty property set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// Get a value as a string slice, if it is a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Insert a value, returning the previous one
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PropertyValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, PropertyValue> {
        self.0.keys()
    }

    /// Keep only the entries for which `f` returns true
    pub fn retain(&mut self, mut f: impl FnMut(&str, &PropertyValue) -> bool) {
        self.0.retain(|k, v| f(k, v));
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Copy of this set without any info keys
    pub fn without_info(&self) -> PropertySet {
        let mut out = PropertySet::new();
        copy(&!KeySpec::info(), self, &mut out);
        out
    }

    /// Convert a JSON object into a property set
    ///
    /// Returns `None` for anything that is not an object.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        value
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn into_inner(self) -> BTreeMap<String, PropertyValue> {
        self.0
    }
}

/// Whether a value can be stored in a configuration
///
/// Scalars are supported, as are arrays whose elements are all scalars of
/// the same kind. `null`, objects and nested or mixed arrays are not.
pub fn is_supported_value(value: &PropertyValue) -> bool {
    use serde_json::Value;

    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
        Value::Array(items) => {
            let mut kind = None;
            items.iter().all(|item| {
                let item_kind = match item {
                    Value::String(_) => 0,
                    Value::Number(_) => 1,
                    Value::Bool(_) => 2,
                    _ => return false,
                };
                *kind.get_or_insert(item_kind) == item_kind
            })
        }
        Value::Null | Value::Object(_) => false,
    }
}

impl FromIterator<(String, PropertyValue)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PropertySet {
    type Item = (&'a String, &'a PropertyValue);
    type IntoIter = btree_map::Iter<'a, String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for PropertySet {
    type Item = (String, PropertyValue);
    type IntoIter = btree_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertySet {
    fn from(map: BTreeMap<String, PropertyValue>) -> Self {
        Self(map)
    }
}

impl From<HashMap<String, String>> for PropertySet {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().map(|(k, v)| (k, PropertyValue::String(v))).collect()
    }
}

impl From<BTreeMap<String, String>> for PropertySet {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().map(|(k, v)| (k, PropertyValue::String(v))).collect()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for PropertySet {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::String(v.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ordered_iteration() {
        let props = PropertySet::from([("b", "2"), ("a", "1"), ("c", "3")]);
        let keys: Vec<&String> = props.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_supported_values() {
        assert!(is_supported_value(&json!("text")));
        assert!(is_supported_value(&json!(42)));
        assert!(is_supported_value(&json!(true)));
        assert!(is_supported_value(&json!(["a", "b"])));
        assert!(is_supported_value(&json!([])));

        assert!(!is_supported_value(&json!(null)));
        assert!(!is_supported_value(&json!({"nested": 1})));
        assert!(!is_supported_value(&json!(["a", 1])));
        assert!(!is_supported_value(&json!([["a"]])));
    }

    #[test]
    fn test_without_info() {
        let props = PropertySet::from([("x", "1"), (INFO_TIMESTAMP, "now"), (SERVICE_PID, "svc")]);
        let stripped = props.without_info();
        assert_eq!(stripped, PropertySet::from([("x", "1"), (SERVICE_PID, "svc")]));
    }

    #[test]
    fn test_from_json() {
        let props = PropertySet::from_json(&json!({"port": 8080, "host": "localhost"})).unwrap();
        assert_eq!(props.get("port"), Some(&json!(8080)));
        assert_eq!(props.get_str("host"), Some("localhost"));

        assert!(PropertySet::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_serde_transparent() {
        let props = PropertySet::from([("a", "1")]);
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"a":"1"}"#);
    }
}
