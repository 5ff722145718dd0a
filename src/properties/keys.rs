// src/properties/keys.rs

//! Key specifications and dictionary comparison
//!
//! A [`KeySpec`] is a predicate over property keys. Specs compose with
//! [`KeySpec::and`], [`KeySpec::or`] and `!`, which is how the pipeline
//! separates volatile provenance metadata from comparable content.

use super::{INFO_PREFIX, PropertySet, PropertyValue, SERVICE_FACTORYPID, SERVICE_PID};
use crate::error::Result;
use regex::Regex;
use std::ops::Not;
use std::sync::LazyLock;

static INFO_KEYS: LazyLock<KeySpec> = LazyLock::new(|| {
    KeySpec::Regex(Regex::new(&format!("^{}", regex::escape(INFO_PREFIX))).unwrap())
});

/// Predicate over property keys
#[derive(Debug, Clone)]
pub enum KeySpec {
    /// Matches every key
    Any,
    /// Matches exactly one key
    Literal(String),
    /// Matches keys the expression finds a match in
    Regex(Regex),
    And(Box<KeySpec>, Box<KeySpec>),
    Or(Box<KeySpec>, Box<KeySpec>),
    Not(Box<KeySpec>),
}

impl KeySpec {
    /// Build a regex-based spec
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn literal(key: impl Into<String>) -> Self {
        Self::Literal(key.into())
    }

    /// Keys starting with the info prefix
    pub fn info() -> Self {
        INFO_KEYS.clone()
    }

    /// `service.pid` or `service.factoryPid`
    pub fn service() -> Self {
        Self::literal(SERVICE_PID).or(Self::literal(SERVICE_FACTORYPID))
    }

    /// Keys that flow from routing metadata into adapted properties
    pub fn reserved() -> Self {
        Self::info().or(Self::service())
    }

    pub fn and(self, other: KeySpec) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: KeySpec) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Check whether a key satisfies this spec
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(literal) => literal == key,
            Self::Regex(re) => re.is_match(key),
            Self::And(a, b) => a.matches(key) && b.matches(key),
            Self::Or(a, b) => a.matches(key) || b.matches(key),
            Self::Not(inner) => !inner.matches(key),
        }
    }
}

impl Not for KeySpec {
    type Output = KeySpec;

    fn not(self) -> Self::Output {
        KeySpec::Not(Box::new(self))
    }
}

/// Copy every entry of `source` whose key satisfies `spec` into `target`
///
/// Existing entries in `target` are overwritten.
pub fn copy(spec: &KeySpec, source: &PropertySet, target: &mut PropertySet) {
    for (key, value) in source.iter().filter(|(k, _)| spec.matches(k)) {
        target.insert(key.clone(), value.clone());
    }
}

/// Content equality of two optional property sets
///
/// Absent vs absent is equal, absent vs present is not.
pub fn equal(source: Option<&PropertySet>, target: Option<&PropertySet>) -> bool {
    match (source, target) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => false,
    }
}

/// Equality after dropping every key matching `ignored` from both sides
pub fn equal_ignoring(
    ignored: &KeySpec,
    source: Option<&PropertySet>,
    target: Option<&PropertySet>,
) -> bool {
    let keep = !ignored.clone();
    let filter = |props: &PropertySet| {
        let mut out = PropertySet::new();
        copy(&keep, props, &mut out);
        out
    };

    let source = source.map(filter);
    let target = target.map(filter);
    equal(source.as_ref(), target.as_ref())
}

// Numbers compare by value so that 8080 and 8080.0 are the same setting.
fn values_equal(a: &PropertyValue, b: &PropertyValue) -> bool {
    match (a, b) {
        (PropertyValue::Number(x), PropertyValue::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(fx), Some(fy)) if fx == fy)
        }
        (PropertyValue::Array(xs), PropertyValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{INFO_ADAPTER, INFO_TIMESTAMP};
    use serde_json::json;

    #[test]
    fn test_spec_composition() {
        let info = KeySpec::info();
        assert!(info.matches(INFO_TIMESTAMP));
        assert!(!info.matches("conflux.other"));
        assert!(!info.matches("x.conflux.info.y"));

        let reserved = KeySpec::reserved();
        assert!(reserved.matches(SERVICE_PID));
        assert!(reserved.matches(SERVICE_FACTORYPID));
        assert!(reserved.matches(INFO_ADAPTER));
        assert!(!reserved.matches("port"));

        let content = !KeySpec::reserved();
        assert!(content.matches("port"));
        assert!(!content.matches(SERVICE_PID));

        let both = KeySpec::regex("^db\\.").unwrap().and(KeySpec::literal("db.url"));
        assert!(both.matches("db.url"));
        assert!(!both.matches("db.user"));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(KeySpec::regex("(unclosed").is_err());
    }

    #[test]
    fn test_copy_selected_keys() {
        let source = PropertySet::from([("a", "1"), (SERVICE_PID, "svc"), (INFO_TIMESTAMP, "t")]);
        let mut target = PropertySet::from([("a", "0")]);

        copy(&KeySpec::reserved(), &source, &mut target);

        assert_eq!(target.get_str("a"), Some("0"));
        assert_eq!(target.get_str(SERVICE_PID), Some("svc"));
        assert_eq!(target.get_str(INFO_TIMESTAMP), Some("t"));
    }

    #[test]
    fn test_equal_null_handling() {
        let props = PropertySet::from([("a", "1")]);
        assert!(equal(None, None));
        assert!(!equal(Some(&props), None));
        assert!(!equal(None, Some(&props)));
    }

    #[test]
    fn test_equal_sizes_and_values() {
        let a = PropertySet::from([("a", "1"), ("b", "2")]);
        let b = PropertySet::from([("b", "2"), ("a", "1")]);
        let c = PropertySet::from([("a", "1")]);
        let d = PropertySet::from([("a", "1"), ("b", "3")]);

        assert!(equal(Some(&a), Some(&b)));
        assert!(!equal(Some(&a), Some(&c)));
        assert!(!equal(Some(&a), Some(&d)));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let a = PropertySet::new().with("port", json!(8080));
        let b = PropertySet::new().with("port", json!(8080.0));
        assert!(equal(Some(&a), Some(&b)));
    }

    #[test]
    fn test_info_keys_ignored() {
        let a = PropertySet::from([("x", "1"), (INFO_TIMESTAMP, "2024-01-01T00:00:00Z")]);
        let b = PropertySet::from([
            ("x", "1"),
            (INFO_TIMESTAMP, "2025-06-01T00:00:00Z"),
            (INFO_ADAPTER, "json"),
        ]);

        assert!(!equal(Some(&a), Some(&b)));
        assert!(equal_ignoring(&KeySpec::info(), Some(&a), Some(&b)));
    }
}
