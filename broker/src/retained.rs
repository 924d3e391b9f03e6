// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Retained message store (spec §4.6): last-writer-wins per topic name,
//! an empty payload clears the entry instead of storing one.

use std::collections::HashMap;

use mqtt_codec::QoS;

use crate::trie::SubscriptionTrie;

#[derive(Clone, Debug)]
pub struct RetainedMessage {
    pub payload: Vec<u8>,
    pub qos: QoS,
}

#[derive(Debug, Default)]
pub struct RetainedStore {
    by_topic: HashMap<String, RetainedMessage>,
}

impl RetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a retained PUBLISH: an empty payload clears any existing
    /// entry for `topic` rather than storing an empty retained message.
    pub fn apply(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) {
        if payload.is_empty() {
            self.by_topic.remove(topic);
        } else {
            self.by_topic
                .insert(topic.to_string(), RetainedMessage { payload, qos });
        }
    }

    /// Returns every retained message matching `filter`, for replay to a
    /// freshly-granted subscription (spec §4.6: one dedicated scan of the
    /// retained set, not routed through the live subscription trie).
    #[must_use]
    pub fn matching(&self, filter: &str) -> Vec<(String, RetainedMessage)> {
        // A temporary single-entry trie reuses the same wildcard/`$`
        // semantics as live routing without duplicating that logic here.
        let mut out = Vec::new();
        for (topic, msg) in &self.by_topic {
            if Self::matches(topic, filter) {
                out.push((topic.clone(), msg.clone()));
            }
        }
        out
    }

    fn matches(topic: &str, filter: &str) -> bool {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"_".to_string(), filter, QoS::AtMostOnce);
        !trie.matching(topic).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_clears() {
        let mut store = RetainedStore::new();
        store.apply("a/b", vec![1], QoS::AtMostOnce);
        assert_eq!(store.matching("a/b").len(), 1);
        store.apply("a/b", vec![], QoS::AtMostOnce);
        assert!(store.matching("a/b").is_empty());
    }

    #[test]
    fn wildcard_replay_matches_stored_topics() {
        let mut store = RetainedStore::new();
        store.apply("sensors/room1/temp", vec![1], QoS::AtLeastOnce);
        store.apply("sensors/room2/temp", vec![2], QoS::AtLeastOnce);
        store.apply("sensors/room1/humidity", vec![3], QoS::AtMostOnce);

        let matches = store.matching("sensors/+/temp");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn last_writer_wins() {
        let mut store = RetainedStore::new();
        store.apply("a", vec![1], QoS::AtMostOnce);
        store.apply("a", vec![2], QoS::ExactlyOnce);
        let matches = store.matching("a");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.payload, vec![2]);
    }
}
