// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! In-memory session state, owned entirely by the dispatcher task (spec
//! §4.4 / §5: no shared-memory access from connection tasks).

use std::collections::{HashMap, HashSet, VecDeque};

use mqtt_codec::{PacketId, QoS};

use crate::types::{ApplicationMessage, ConnId};

/// Allocates packet ids `1..=65535`, skipping any id a caller reports as
/// still in use. Wraps around rather than growing unbounded, matching
/// spec's "16-bit id space, reused once acknowledged".
#[derive(Debug, Default)]
pub struct PidPool {
    next: u16,
}

impl PidPool {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocates the next free id not present in `in_use`. `in_use` is
    /// checked exhaustively before giving up, so a session with fewer
    /// than 65535 in-flight packets always succeeds.
    pub fn alloc(&mut self, in_use: &HashSet<PacketId>) -> Option<PacketId> {
        for _ in 0..u16::MAX {
            let candidate = if self.next == 0 { 1 } else { self.next };
            self.next = candidate.wrapping_add(1);
            let pid = PacketId::new(candidate);
            if !in_use.contains(&pid) {
                return Some(pid);
            }
        }
        None
    }
}

/// State of one outbound (broker-to-subscriber) QoS > 0 delivery.
#[derive(Debug, Clone)]
pub enum OutboundState {
    /// QoS 1 awaiting PUBACK, or QoS 2 awaiting PUBREC. Replayed as a
    /// `dup=1` PUBLISH on reconnect.
    Published {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    /// QoS 2 only: PUBREC received, PUBREL sent, awaiting PUBCOMP.
    /// Replayed as a bare PUBREL on reconnect.
    PubRelSent,
}

/// A will message armed at CONNECT time and fired on abnormal
/// disconnect (spec §4.4).
#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// One client's persistent (or clean) session state.
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub clean_session: bool,
    pub conn_id: Option<ConnId>,
    pub keep_alive: u16,
    pub will: Option<Will>,

    /// Filters this session is subscribed to, with the granted max QoS.
    /// Canonical list used to sweep the trie clean on teardown; the trie
    /// itself is the thing actually consulted for routing.
    pub subscriptions: HashMap<String, QoS>,

    pid_pool: PidPool,
    outbound_order: VecDeque<PacketId>,
    outbound_state: HashMap<PacketId, OutboundState>,
    /// QoS 2 inbound dedup: pids for which this session (as publisher)
    /// has already been routed once and is now only waiting for PUBREL.
    inbound_received: HashSet<PacketId>,

    /// Backlog accumulated while detached (no live connection). Bounded;
    /// overflow drops the oldest entry regardless of QoS, distinct from
    /// the connected writer's backpressure policy in spec §5/§7.
    pub queued_messages: VecDeque<ApplicationMessage>,
    queue_capacity: usize,
    pub dropped_while_detached: u64,
}

impl Session {
    #[must_use]
    pub fn new(client_id: String, clean_session: bool, keep_alive: u16, queue_capacity: usize) -> Self {
        Self {
            client_id,
            clean_session,
            conn_id: None,
            keep_alive,
            will: None,
            subscriptions: HashMap::new(),
            pid_pool: PidPool::new(),
            outbound_order: VecDeque::new(),
            outbound_state: HashMap::new(),
            inbound_received: HashSet::new(),
            queued_messages: VecDeque::new(),
            queue_capacity,
            dropped_while_detached: 0,
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.conn_id.is_some()
    }

    /// Enqueues a message for later delivery while detached. Returns
    /// `true` if an older message was dropped to make room.
    pub fn enqueue_detached(&mut self, message: ApplicationMessage) -> bool {
        let dropped = if self.queued_messages.len() >= self.queue_capacity {
            self.queued_messages.pop_front();
            self.dropped_while_detached += 1;
            true
        } else {
            false
        };
        self.queued_messages.push_back(message);
        dropped
    }

    /// Allocates a packet id and records it as a fresh outbound QoS > 0
    /// delivery in the `Published` state.
    pub fn begin_outbound(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Option<PacketId> {
        let in_use: HashSet<PacketId> = self.outbound_state.keys().copied().collect();
        let pid = self.pid_pool.alloc(&in_use)?;
        self.outbound_order.push_back(pid);
        self.outbound_state.insert(
            pid,
            OutboundState::Published {
                topic,
                payload,
                qos,
                retain,
            },
        );
        Some(pid)
    }

    /// PUBACK received for a QoS 1 delivery: fully acknowledged, forget it.
    pub fn on_puback(&mut self, pid: PacketId) -> bool {
        self.forget_outbound(pid)
    }

    /// PUBREC received for a QoS 2 delivery: move to `PubRelSent`.
    pub fn on_pubrec(&mut self, pid: PacketId) -> bool {
        match self.outbound_state.get_mut(&pid) {
            Some(state @ OutboundState::Published { .. }) => {
                *state = OutboundState::PubRelSent;
                true
            }
            _ => false,
        }
    }

    /// PUBCOMP received for a QoS 2 delivery: fully acknowledged, forget it.
    pub fn on_pubcomp(&mut self, pid: PacketId) -> bool {
        self.forget_outbound(pid)
    }

    fn forget_outbound(&mut self, pid: PacketId) -> bool {
        if self.outbound_state.remove(&pid).is_some() {
            self.outbound_order.retain(|p| *p != pid);
            true
        } else {
            false
        }
    }

    /// Returns `(pubrels, publishes)` to replay on reconnect, each in
    /// original send order: PUBRELs for deliveries already past PUBREC,
    /// then `dup=1` PUBLISHes for deliveries still awaiting first ack.
    #[must_use]
    pub fn replay_outbound(&self) -> (Vec<PacketId>, Vec<(PacketId, String, Vec<u8>, QoS, bool)>) {
        let mut pubrels = Vec::new();
        let mut publishes = Vec::new();
        for pid in &self.outbound_order {
            match self.outbound_state.get(pid) {
                Some(OutboundState::PubRelSent) => pubrels.push(*pid),
                Some(OutboundState::Published {
                    topic,
                    payload,
                    qos,
                    retain,
                }) => publishes.push((*pid, topic.clone(), payload.clone(), *qos, *retain)),
                None => {}
            }
        }
        (pubrels, publishes)
    }

    /// Inbound (publisher-facing) QoS 2 dedup: returns `true` the first
    /// time `pid` is seen (message should be routed), `false` on a
    /// retransmit (only re-ack, don't re-route).
    pub fn begin_inbound_qos2(&mut self, pid: PacketId) -> bool {
        self.inbound_received.insert(pid)
    }

    /// PUBREL received: inbound QoS 2 exchange complete, forget the pid.
    pub fn on_pubrel(&mut self, pid: PacketId) {
        self.inbound_received.remove(&pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_pool_skips_in_use() {
        let mut pool = PidPool::new();
        let mut in_use = HashSet::new();
        in_use.insert(PacketId::new(1));
        in_use.insert(PacketId::new(2));
        assert_eq!(pool.alloc(&in_use), Some(PacketId::new(3)));
    }

    #[test]
    fn outbound_qos2_lifecycle() {
        let mut session = Session::new("c1".to_string(), true, 60, 10);
        let pid = session
            .begin_outbound("a/b".to_string(), vec![1, 2], QoS::ExactlyOnce, false)
            .unwrap();
        assert!(session.on_pubrec(pid));
        let (pubrels, publishes) = session.replay_outbound();
        assert_eq!(pubrels, vec![pid]);
        assert!(publishes.is_empty());
        assert!(session.on_pubcomp(pid));
        let (pubrels, publishes) = session.replay_outbound();
        assert!(pubrels.is_empty());
        assert!(publishes.is_empty());
    }

    #[test]
    fn outbound_qos1_replays_as_dup_publish() {
        let mut session = Session::new("c1".to_string(), true, 60, 10);
        let pid = session
            .begin_outbound("a/b".to_string(), vec![9], QoS::AtLeastOnce, false)
            .unwrap();
        let (pubrels, publishes) = session.replay_outbound();
        assert!(pubrels.is_empty());
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].0, pid);
    }

    #[test]
    fn detached_queue_drops_oldest_on_overflow() {
        let mut session = Session::new("c1".to_string(), false, 60, 2);
        let msg = |topic: &str| ApplicationMessage {
            topic: topic.to_string(),
            payload: vec![],
            qos: QoS::AtMostOnce,
            retain: false,
            source_client_id: "x".to_string(),
        };
        assert!(!session.enqueue_detached(msg("a")));
        assert!(!session.enqueue_detached(msg("b")));
        assert!(session.enqueue_detached(msg("c")));
        assert_eq!(session.queued_messages.len(), 2);
        assert_eq!(session.queued_messages.front().unwrap().topic, "b");
        assert_eq!(session.dropped_while_detached, 1);
    }

    #[test]
    fn inbound_qos2_dedup() {
        let mut session = Session::new("c1".to_string(), true, 60, 10);
        let pid = PacketId::new(5);
        assert!(session.begin_inbound_qos2(pid));
        assert!(!session.begin_inbound_qos2(pid));
        session.on_pubrel(pid);
        assert!(session.begin_inbound_qos2(pid));
    }
}
