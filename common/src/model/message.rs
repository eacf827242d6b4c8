use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A message in flight: an ordered sequence of byte parts plus a string
/// metadata map.
///
/// Part order is stable through cloning and iteration. Metadata iteration
/// order is unspecified; [`Message::metadata_json`] is the only observable
/// serialisation and always emits keys in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    parts: Vec<Vec<u8>>,
    metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(parts: Vec<Vec<u8>>) -> Self {
        Message {
            parts,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(parts: Vec<Vec<u8>>, metadata: HashMap<String, String>) -> Self {
        Message { parts, metadata }
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.parts.get(index).map(Vec::as_slice)
    }

    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    pub fn push_part(&mut self, part: Vec<u8>) {
        self.parts.push(part);
    }

    pub fn insert_part(&mut self, index: usize, part: Vec<u8>) {
        let index = index.min(self.parts.len());
        self.parts.insert(index, part);
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn iter_metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialises the metadata map as a JSON object with lexicographically
    /// sorted keys.
    pub fn metadata_json(&self) -> Vec<u8> {
        let sorted: BTreeMap<&str, &str> = self.iter_metadata().collect();
        serde_json::to_vec(&sorted).unwrap_or_else(|_| b"{}".to_vec())
    }

    pub fn into_parts(self) -> (Vec<Vec<u8>>, HashMap<String, String>) {
        (self.parts, self.metadata)
    }
}

impl From<Vec<Vec<u8>>> for Message {
    fn from(parts: Vec<Vec<u8>>) -> Self {
        Message::new(parts)
    }
}
