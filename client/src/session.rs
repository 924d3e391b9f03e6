// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Client-side in-flight tracking: packet id allocation and pending
//! acknowledgements. Mirrors `broker::session` in shape, sized down to
//! what one client connection needs rather than a whole broker.

use std::collections::{HashMap, HashSet};

use mqtt_codec::{PacketId, QoS, SubscribeAck};
use tokio::sync::oneshot;

use crate::error::Error;

/// Allocates packet ids `1..=65535`, skipping ones still in use. Identical
/// in spirit to `broker::session::PidPool`; duplicated rather than shared
/// across crates since the two sides track different things.
#[derive(Debug, Default)]
pub struct PidPool {
    next: u16,
}

impl PidPool {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

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

/// State of one outbound QoS > 0 PUBLISH this client sent.
pub enum OutboundPublish {
    /// QoS 1 awaiting PUBACK, or QoS 2 awaiting PUBREC.
    Sent {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        ack: oneshot::Sender<Result<(), Error>>,
    },
    /// QoS 2 only: PUBREC received, PUBREL sent, awaiting PUBCOMP.
    PubRelSent {
        ack: oneshot::Sender<Result<(), Error>>,
    },
}

#[derive(Default)]
pub struct Session {
    pid_pool: PidPool,
    outbound_publish: HashMap<PacketId, OutboundPublish>,
    pending_subscribe: HashMap<PacketId, oneshot::Sender<Result<Vec<SubscribeAck>, Error>>>,
    pending_unsubscribe: HashMap<PacketId, oneshot::Sender<Result<(), Error>>>,
    /// QoS 2 inbound dedup: pids we've already sent PUBREC for and are
    /// waiting on the broker's PUBREL before we can forget them.
    inbound_qos2_received: HashSet<PacketId>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn in_use_pids(&self) -> HashSet<PacketId> {
        self.outbound_publish
            .keys()
            .chain(self.pending_subscribe.keys())
            .chain(self.pending_unsubscribe.keys())
            .copied()
            .collect()
    }

    pub fn next_pid(&mut self) -> Option<PacketId> {
        let in_use = self.in_use_pids();
        self.pid_pool.alloc(&in_use)
    }

    pub fn begin_publish(
        &mut self,
        pid: PacketId,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        ack: oneshot::Sender<Result<(), Error>>,
    ) {
        self.outbound_publish.insert(
            pid,
            OutboundPublish::Sent {
                topic,
                payload,
                qos,
                retain,
                ack,
            },
        );
    }

    pub fn begin_subscribe(&mut self, pid: PacketId, ack: oneshot::Sender<Result<Vec<SubscribeAck>, Error>>) {
        self.pending_subscribe.insert(pid, ack);
    }

    pub fn begin_unsubscribe(&mut self, pid: PacketId, ack: oneshot::Sender<Result<(), Error>>) {
        self.pending_unsubscribe.insert(pid, ack);
    }

    /// PUBACK for a QoS 1 publish: complete, notify the caller.
    pub fn on_puback(&mut self, pid: PacketId) {
        if let Some(OutboundPublish::Sent { ack, .. }) = self.outbound_publish.remove(&pid) {
            let _ = ack.send(Ok(()));
        }
    }

    /// PUBREC for a QoS 2 publish: move to `PubRelSent`, return `true` if a
    /// PUBREL should now be sent.
    pub fn on_pubrec(&mut self, pid: PacketId) -> bool {
        if let Some(OutboundPublish::Sent { ack, .. }) = self.outbound_publish.remove(&pid) {
            self.outbound_publish.insert(pid, OutboundPublish::PubRelSent { ack });
            true
        } else {
            false
        }
    }

    /// PUBCOMP for a QoS 2 publish: complete, notify the caller.
    pub fn on_pubcomp(&mut self, pid: PacketId) {
        if let Some(OutboundPublish::PubRelSent { ack }) = self.outbound_publish.remove(&pid) {
            let _ = ack.send(Ok(()));
        }
    }

    pub fn on_suback(&mut self, pid: PacketId, acks: Vec<SubscribeAck>) {
        if let Some(sender) = self.pending_subscribe.remove(&pid) {
            let _ = sender.send(Ok(acks));
        }
    }

    pub fn on_unsuback(&mut self, pid: PacketId) {
        if let Some(sender) = self.pending_unsubscribe.remove(&pid) {
            let _ = sender.send(Ok(()));
        }
    }

    /// Inbound QoS 2 dedup (broker-to-client direction): `true` the first
    /// time `pid` is seen (deliver it), `false` on a retransmit.
    pub fn begin_inbound_qos2(&mut self, pid: PacketId) -> bool {
        self.inbound_qos2_received.insert(pid)
    }

    pub fn on_pubrel_from_broker(&mut self, pid: PacketId) {
        self.inbound_qos2_received.remove(&pid);
    }

    /// Fails every pending request with `err`, used when the connection is
    /// lost while acks are outstanding. Clears all in-flight state; a
    /// reconnect starts the pid space fresh (this client never resumes a
    /// broker session across a dropped TCP connection, matching the
    /// `clean_session` default).
    pub fn fail_all(&mut self, err: &Error) {
        for (_, state) in self.outbound_publish.drain() {
            let ack = match state {
                OutboundPublish::Sent { ack, .. } | OutboundPublish::PubRelSent { ack } => ack,
            };
            let _ = ack.send(Err(err.clone()));
        }
        for (_, sender) in self.pending_subscribe.drain() {
            let _ = sender.send(Err(err.clone()));
        }
        for (_, sender) in self.pending_unsubscribe.drain() {
            let _ = sender.send(Err(err.clone()));
        }
        self.inbound_qos2_received.clear();
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
    fn qos1_publish_completes_on_puback() {
        let mut session = Session::new();
        let pid = PacketId::new(1);
        let (tx, rx) = oneshot::channel();
        session.begin_publish(pid, "a".into(), vec![], QoS::AtLeastOnce, false, tx);
        session.on_puback(pid);
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn qos2_publish_completes_on_pubcomp() {
        let mut session = Session::new();
        let pid = PacketId::new(1);
        let (tx, rx) = oneshot::channel();
        session.begin_publish(pid, "a".into(), vec![], QoS::ExactlyOnce, false, tx);
        assert!(session.on_pubrec(pid));
        assert!(rx.try_recv().is_err());
        session.on_pubcomp(pid);
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn inbound_qos2_dedup() {
        let mut session = Session::new();
        let pid = PacketId::new(9);
        assert!(session.begin_inbound_qos2(pid));
        assert!(!session.begin_inbound_qos2(pid));
        session.on_pubrel_from_broker(pid);
        assert!(session.begin_inbound_qos2(pid));
    }

    #[test]
    fn fail_all_notifies_every_pending_caller() {
        let mut session = Session::new();
        let (tx1, rx1) = oneshot::channel();
        session.begin_publish(PacketId::new(1), "a".into(), vec![], QoS::AtLeastOnce, false, tx1);
        let (tx2, rx2) = oneshot::channel();
        session.begin_subscribe(PacketId::new(2), tx2);
        session.fail_all(&Error::new(crate::error::ErrorKind::ConnectionLost, "gone"));
        assert!(rx1.try_recv().unwrap().is_err());
        assert!(rx2.try_recv().unwrap().is_err());
    }
}
