use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressMapError {
    #[error("sensor map is empty; nothing to subscribe to")]
    Empty,
    #[error("topic {topic:?} is mapped by both {first:?} and {second:?}")]
    DuplicateTopic {
        topic: String,
        first: String,
        second: String,
    },
}

/// Bidirectional mapping between canonical sensor keys and the external
/// topics they are published on. Immutable once built.
#[derive(Debug, Clone)]
pub struct AddressMap {
    key_to_topic: BTreeMap<String, String>,
    topic_to_key: BTreeMap<String, String>,
}

impl AddressMap {
    /// Build from a `key → topic` mapping, rejecting any topic claimed by
    /// more than one key.
    pub fn new(key_to_topic: HashMap<String, String>) -> Result<Self, AddressMapError> {
        if key_to_topic.is_empty() {
            return Err(AddressMapError::Empty);
        }

        // Sorted so a collision always reports the same pair.
        let key_to_topic: BTreeMap<String, String> = key_to_topic.into_iter().collect();
        let mut topic_to_key = BTreeMap::new();

        for (key, topic) in &key_to_topic {
            if let Some(first) = topic_to_key.insert(topic.clone(), key.clone()) {
                return Err(AddressMapError::DuplicateTopic {
                    topic: topic.clone(),
                    first,
                    second: key.clone(),
                });
            }
        }

        Ok(Self {
            key_to_topic,
            topic_to_key,
        })
    }

    /// Every mapped topic, in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topic_to_key.keys().map(String::as_str)
    }

    /// Canonical key for an inbound topic, if it is mapped.
    pub fn key_for(&self, topic: &str) -> Option<&str> {
        self.topic_to_key.get(topic).map(String::as_str)
    }

    #[allow(dead_code)]
    pub fn topic_for(&self, key: &str) -> Option<&str> {
        self.key_to_topic.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.key_to_topic.len()
    }
}
