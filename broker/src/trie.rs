// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! A real trie over topic levels, required by spec once subscription
//! counts grow past a flat linear scan (see DESIGN.md: the teacher's own
//! `SubTrie` is actually a per-session `HashMap` scanned linearly on every
//! publish; this is a genuine prefix tree keyed by topic level).

use std::collections::HashMap;

use mqtt_codec::QoS;

use crate::types::ClientId;

#[derive(Debug, Default)]
struct Node {
    literal: HashMap<String, Node>,
    plus: Option<Box<Node>>,
    hash: HashMap<ClientId, QoS>,
    here: HashMap<ClientId, QoS>,
}

impl Node {
    fn child_mut(&mut self, level: &str) -> &mut Self {
        match level {
            "+" => self.plus.get_or_insert_with(|| Box::new(Node::default())),
            _ => self.literal.entry(level.to_string()).or_default(),
        }
    }
}

/// Maps topic filters to the set of subscribed sessions, each with the
/// max QoS it requested. One node per topic level; `#` and exact-match
/// subscriptions terminate at `hash`/`here` rather than becoming a
/// traversable child, matching spec's "`#` subtrees are always terminal".
#[derive(Debug, Default)]
pub struct SubscriptionTrie {
    root: Node,
}

impl SubscriptionTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the `(client, max_qos)` entry for `filter`.
    /// Idempotent by `(client_id, filter)`: resubscribing replaces the
    /// granted QoS rather than duplicating the entry.
    pub fn subscribe(&mut self, client_id: &ClientId, filter: &str, max_qos: QoS) {
        let mut node = &mut self.root;
        let levels: Vec<&str> = filter.split('/').collect();
        for (i, level) in levels.iter().enumerate() {
            let is_last = i + 1 == levels.len();
            if *level == "#" && is_last {
                node.hash.insert(client_id.clone(), max_qos);
                return;
            }
            node = node.child_mut(level);
        }
        node.here.insert(client_id.clone(), max_qos);
    }

    /// Removes `client_id`'s entry for `filter`, pruning nothing eagerly
    /// (empty branches are harmless dead weight reclaimed on the next
    /// full-session removal; pruning eagerly would complicate traversal
    /// for negligible benefit at broker scale).
    pub fn unsubscribe(&mut self, client_id: &ClientId, filter: &str) -> bool {
        let mut node = &mut self.root;
        let levels: Vec<&str> = filter.split('/').collect();
        for (i, level) in levels.iter().enumerate() {
            let is_last = i + 1 == levels.len();
            if *level == "#" && is_last {
                return node.hash.remove(client_id).is_some();
            }
            node = match level {
                &"+" => match node.plus.as_deref_mut() {
                    Some(n) => n,
                    None => return false,
                },
                _ => match node.literal.get_mut(*level) {
                    Some(n) => n,
                    None => return false,
                },
            };
        }
        node.here.remove(client_id).is_some()
    }

    /// Removes every subscription belonging to `client_id` across all of
    /// `filters` -- used when a clean session disconnects or is destroyed
    /// by takeover.
    pub fn remove_session(&mut self, client_id: &ClientId, filters: &[String]) {
        for filter in filters {
            self.unsubscribe(client_id, filter);
        }
    }

    /// Returns every `(client_id, max_qos)` whose subscription matches
    /// `topic`, with a client matched by more than one filter collapsed
    /// into the single entry carrying the maximum granted QoS (spec
    /// §4.5: "a session matched by multiple filters receives the message
    /// once, at the maximum of those max_qos values").
    #[must_use]
    pub fn matching(&self, topic: &str) -> Vec<(ClientId, QoS)> {
        let dollar = topic.starts_with('$');
        let levels: Vec<&str> = topic.split('/').collect();
        let mut out: HashMap<ClientId, QoS> = HashMap::new();
        Self::walk(&self.root, &levels, dollar, true, &mut out);
        out.into_iter().collect()
    }

    fn walk(
        node: &Node,
        levels: &[&str],
        dollar_topic: bool,
        at_root: bool,
        out: &mut HashMap<ClientId, QoS>,
    ) {
        // A leading `$` level in the topic is only ever matched by an
        // identical leading literal level in the filter -- `+` and `#`
        // never cross it (spec §4.5, covers `$SYS`).
        if at_root && dollar_topic {
            if let Some(first) = levels.first() {
                if let Some(child) = node.literal.get(*first) {
                    Self::walk(child, &levels[1..], dollar_topic, false, out);
                }
            }
            return;
        }

        match levels.first() {
            None => {
                for (client_id, qos) in &node.here {
                    Self::merge(out, client_id, *qos);
                }
                for (client_id, qos) in &node.hash {
                    Self::merge(out, client_id, *qos);
                }
            }
            Some(level) => {
                for (client_id, qos) in &node.hash {
                    Self::merge(out, client_id, *qos);
                }
                if let Some(child) = node.literal.get(*level) {
                    Self::walk(child, &levels[1..], dollar_topic, false, out);
                }
                if !level.is_empty() {
                    if let Some(plus) = node.plus.as_deref() {
                        Self::walk(plus, &levels[1..], dollar_topic, false, out);
                    }
                }
            }
        }
    }

    fn merge(out: &mut HashMap<ClientId, QoS>, client_id: &ClientId, qos: QoS) {
        out.entry(client_id.clone())
            .and_modify(|existing| *existing = (*existing).max(qos))
            .or_insert(qos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_plus_and_hash() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"a".to_string(), "sensors/+/temp", QoS::AtMostOnce);
        trie.subscribe(&"b".to_string(), "sensors/#", QoS::AtLeastOnce);
        trie.subscribe(&"c".to_string(), "sensors/room1/temp", QoS::ExactlyOnce);

        let matches = trie.matching("sensors/room1/temp");
        let ids: HashMap<ClientId, QoS> = matches.into_iter().collect();
        assert_eq!(ids.get("a"), Some(&QoS::AtMostOnce));
        assert_eq!(ids.get("b"), Some(&QoS::AtLeastOnce));
        assert_eq!(ids.get("c"), Some(&QoS::ExactlyOnce));
    }

    #[test]
    fn one_client_multiple_filters_collapses_to_max_qos() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"a".to_string(), "x/y", QoS::AtMostOnce);
        trie.subscribe(&"a".to_string(), "x/#", QoS::ExactlyOnce);

        let matches = trie.matching("x/y");
        assert_eq!(matches, vec![("a".to_string(), QoS::ExactlyOnce)]);
    }

    #[test]
    fn resubscribe_replaces_qos() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"a".to_string(), "x/y", QoS::AtMostOnce);
        trie.subscribe(&"a".to_string(), "x/y", QoS::ExactlyOnce);
        assert_eq!(trie.matching("x/y"), vec![("a".to_string(), QoS::ExactlyOnce)]);
    }

    #[test]
    fn dollar_topics_not_matched_by_wildcards() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"a".to_string(), "#", QoS::AtMostOnce);
        trie.subscribe(&"b".to_string(), "+/broker/uptime", QoS::AtMostOnce);
        trie.subscribe(&"c".to_string(), "$SYS/broker/uptime", QoS::AtMostOnce);

        let matches = trie.matching("$SYS/broker/uptime");
        assert_eq!(matches, vec![("c".to_string(), QoS::AtMostOnce)]);
    }

    #[test]
    fn unsubscribe_removes_entry() {
        let mut trie = SubscriptionTrie::new();
        trie.subscribe(&"a".to_string(), "x/#", QoS::AtMostOnce);
        assert!(trie.unsubscribe(&"a".to_string(), "x/#"));
        assert!(trie.matching("x/y").is_empty());
        assert!(!trie.unsubscribe(&"a".to_string(), "x/#"));
    }
}
