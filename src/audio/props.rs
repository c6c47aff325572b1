//! Property sets attached to server objects, and the ALSA card predicate.

use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEVICE_CLASS: &str = "device.class";
pub const DEVICE_API: &str = "device.api";
pub const ALSA_CARD_NAME: &str = "alsa.card_name";

/// String keys to string values, as the audio server reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PropertySet(BTreeMap<String, String>);

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// True iff `key` is present and equal to `expected`.
    pub fn matches(&self, key: &str, expected: &str) -> bool {
        self.get(key) == Some(expected)
    }

    /// Renders the set as `key="value"` pairs, the form module arguments accept.
    pub fn to_module_arg(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Does this property set describe the ALSA sound card `card_name`?
pub fn matches_alsa_card(props: &PropertySet, card_name: &str) -> bool {
    props.matches(DEVICE_CLASS, "sound")
        && props.matches(DEVICE_API, "alsa")
        && props.matches(ALSA_CARD_NAME, card_name)
}
