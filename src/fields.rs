//! Key/value extraction from raw WHOIS responses
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Read-only multi-map of response fields
///
/// WHOIS responses routinely repeat a key (e.g. one `Name Server` line per
/// nameserver): all the values are kept, in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Fields(HashMap<String, Vec<String>>);

impl Fields {
    /// Extracts every key/value pair matched by `pattern` in `text`
    ///
    /// The pattern is expected to have been checked by
    /// [`validate_pattern`](crate::validate_pattern): group 1 is the key and
    /// group 2 is the value. Lines which don't match are ignored.
    pub fn parse(text: &str, pattern: &Regex) -> Self {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        for cap in pattern.captures_iter(text) {
            let (Some(key), Some(value)) = (cap.get(1), cap.get(2)) else {
                trace!("Skipping match with an unset group: {:?}", &cap[0]);
                continue;
            };
            fields
                .entry(key.as_str().to_string())
                .or_default()
                .push(value.as_str().to_string());
        }
        debug!("Extracted {} distinct fields", fields.len());
        Self(fields)
    }

    /// All the values of `key`, in response order
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// The first value of `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The field names, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(key, values)` pairs, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The number of distinct keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
