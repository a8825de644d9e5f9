//! Ordered image metadata
//!
//! Header cards are kept in insertion order. Setting an existing key replaces
//! its value in place, so the original order survives a read/modify/write cycle.

use std::fmt;

/// A scalar header value
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            MetaValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{}", b),
            MetaValue::Int(i) => write!(f, "{}", i),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Ordered string-keyed header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set a value, replacing an existing entry in place
    pub fn set(&mut self, key: &str, value: impl Into<MetaValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every entry of `defaults` whose key is not already present
    ///
    /// Existing values are never overwritten; among duplicate keys in
    /// `defaults` the first one wins.
    ///
    /// # Returns
    /// The keys that were added
    pub fn merge_missing(&mut self, defaults: &Metadata) -> Vec<String> {
        let mut added = Vec::new();
        for (key, value) in defaults.iter() {
            if !self.exists(key) {
                self.entries.push((key.to_string(), value.clone()));
                added.push(key.to_string());
            }
        }
        added
    }
}

impl FromIterator<(String, MetaValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.set(&key, value);
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut md = Metadata::new();
        md.set("A", 1i64);
        md.set("B", "two");
        md.set("A", 3i64);
        let keys: Vec<&str> = md.keys().collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(md.get("A"), Some(&MetaValue::Int(3)));
    }

    #[test]
    fn merge_missing_keeps_existing_values() {
        let mut md = Metadata::new();
        md.set("OBSTYPE", "bias");

        let mut defaults = Metadata::new();
        defaults.set("OBSTYPE", "flat");
        defaults.set("FILTNAME", "r");

        let added = md.merge_missing(&defaults);
        assert_eq!(added, vec!["FILTNAME".to_string()]);
        assert_eq!(md.get_str("OBSTYPE"), Some("bias"));
        assert_eq!(md.get_str("FILTNAME"), Some("r"));
    }

    #[test]
    fn remove_drops_entry() {
        let mut md = Metadata::new();
        md.set("A", true);
        assert_eq!(md.remove("A"), Some(MetaValue::Bool(true)));
        assert!(!md.exists("A"));
        assert!(md.remove("A").is_none());
    }
}
