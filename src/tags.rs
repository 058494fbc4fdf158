//! Tags partition configuration by environment or variant (`env=prod`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single key/value discriminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn env(value: impl Into<String>) -> Self {
        Self::new("env", value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// An order-irrelevant set of tags. Equality and hashing are by content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tags(BTreeSet<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }

    pub fn env(value: impl Into<String>) -> Self {
        Self(BTreeSet::from([Tag::env(value)]))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    pub fn is_subset_of(&self, other: &Tags) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn with(mut self, tag: Tag) -> Self {
        self.0.insert(tag);
        self
    }

    /// Union of both tag sets. A key present in `other` replaces the same key here.
    pub fn merged_with(&self, other: &Tags) -> Tags {
        let mut merged: BTreeSet<Tag> = self
            .0
            .iter()
            .filter(|t| !other.0.iter().any(|o| o.key == t.key))
            .cloned()
            .collect();
        merged.extend(other.0.iter().cloned());
        Tags(merged)
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Parses `key=value[,key=value...]`. An empty string yields empty tags.
impl FromStr for Tags {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tags = Tags::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("invalid tag '{}', expected key=value", part))?;
            if key.trim().is_empty() {
                return Err(format!("invalid tag '{}', empty key", part));
            }
            tags = tags.with(Tag::new(key.trim(), value.trim()));
        }
        Ok(tags)
    }
}
