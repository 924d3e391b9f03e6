// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{PacketId, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::topic::is_valid_topic_name;

/// PUBLISH, carrying an application message either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPacket {
    dup: bool,
    qos: QoS,
    retain: bool,
    topic: String,
    packet_id: Option<PacketId>,
    payload: Vec<u8>,
}

impl PublishPacket {
    /// Builds a new PUBLISH. `packet_id` is assigned by the caller for
    /// `QoS::AtMostOnce`, it must be `0`/absent.
    ///
    /// # Errors
    /// Returns an error if `topic` contains a wildcard character -- a
    /// PUBLISH topic name MUST NOT contain wildcard characters
    /// [MQTT-3.3.2-2].
    pub fn new(topic: &str, qos: QoS, payload: &[u8], retain: bool) -> Result<Self, EncodeError> {
        if !is_valid_topic_name(topic) {
            return Err(EncodeError::InvalidPacketType);
        }
        Ok(Self {
            dup: false,
            qos,
            retain,
            topic: topic.to_string(),
            packet_id: None,
            payload: payload.to_vec(),
        })
    }

    #[must_use]
    pub const fn with_packet_id(mut self, packet_id: PacketId) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub const fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        self.packet_id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            unreachable!("decode_body dispatched only for Publish fixed headers")
        };

        let topic_len = ba.read_u16()? as usize;
        let topic = ba.read_string(topic_len)?;
        if topic.contains(['+', '#']) {
            return Err(DecodeError::InvalidTopicFilter);
        }

        // The Packet Identifier field is only present in PUBLISH Packets
        // where the QoS level is 1 or 2 [MQTT-3.3.2-1].
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(PacketId::decode(ba)?)
        };

        let payload = ba.read_bytes(ba.remaining_bytes())?.to_vec();

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.qos == QoS::AtMostOnce && self.packet_id.is_some() {
            return Err(EncodeError::InvalidPacketType);
        }
        if self.qos != QoS::AtMostOnce && self.packet_id.is_none() {
            return Err(EncodeError::InvalidPacketType);
        }

        let mut body = Vec::new();
        crate::base::encode_string(&mut body, &self.topic)?;
        if let Some(packet_id) = self.packet_id {
            packet_id.encode(&mut body)?;
        }
        body.extend_from_slice(&self.payload);

        let packet_type = PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        };
        let header = FixedHeader::new(packet_type, body.len())?;
        let n = header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(n + body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: &PublishPacket) {
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        let decoded = PublishPacket::decode_body(&mut ba, header).unwrap();
        assert_eq!(&decoded, packet);
    }

    #[test]
    fn qos0_has_no_packet_id() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"hello", false).unwrap();
        roundtrip(&packet);
        assert_eq!(packet.packet_id(), None);
    }

    #[test]
    fn qos1_requires_packet_id_to_encode() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"hello", false).unwrap();
        let mut buf = Vec::new();
        assert_eq!(packet.encode(&mut buf), Err(EncodeError::InvalidPacketType));
    }

    #[test]
    fn qos2_roundtrip_with_dup_and_retain() {
        let packet = PublishPacket::new("a/b/c", QoS::ExactlyOnce, b"payload bytes", true)
            .unwrap()
            .with_packet_id(PacketId::new(42))
            .with_dup(true);
        roundtrip(&packet);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let packet = PublishPacket::new("a", QoS::AtMostOnce, b"", false).unwrap();
        roundtrip(&packet);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn rejects_wildcard_topic() {
        assert_eq!(
            PublishPacket::new("a/+/b", QoS::AtMostOnce, b"", false),
            Err(EncodeError::InvalidPacketType)
        );
    }
}
