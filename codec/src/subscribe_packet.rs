// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::base::{decode_string, encode_string, PacketId, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::topic::validate_topic_filter;

/// One (filter, requested QoS) pair inside a SUBSCRIBE packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeTopic {
    topic: String,
    qos: QoS,
}

impl SubscribeTopic {
    /// # Errors
    /// Returns an error if `topic` is not a well-formed topic filter.
    pub fn new(topic: &str, qos: QoS) -> Result<Self, DecodeError> {
        validate_topic_filter(topic)?;
        Ok(Self {
            topic: topic.to_string(),
            qos,
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }
}

/// SUBSCRIBE, a client request to receive one or more topic filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribePacket {
    packet_id: PacketId,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    #[must_use]
    pub const fn new(topics: Vec<SubscribeTopic>, packet_id: PacketId) -> Self {
        Self { packet_id, topics }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        _fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(ba)?;

        let mut topics = Vec::new();
        // The payload MUST contain at least one Topic Filter / QoS pair
        // [MQTT-3.8.3-3].
        while ba.remaining_bytes() > 0 {
            let topic = decode_string(ba)?;
            validate_topic_filter(&topic)?;
            let qos_byte = ba.read_byte()?;
            // Bits 7-2 of the requested QoS byte are reserved and MUST be
            // set to 0 [MQTT-3.8.3-4].
            if qos_byte & 0b1111_1100 != 0 {
                return Err(DecodeError::InvalidQoS);
            }
            let qos = QoS::try_from(qos_byte)?;
            topics.push(SubscribeTopic { topic, qos });
        }
        if topics.is_empty() {
            return Err(DecodeError::OtherErrors);
        }

        Ok(Self { packet_id, topics })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.topics.is_empty() {
            return Err(EncodeError::InvalidPacketType);
        }
        let mut body = Vec::new();
        self.packet_id.encode(&mut body)?;
        for t in &self.topics {
            encode_string(&mut body, &t.topic)?;
            body.push(t.qos as u8);
        }

        let header = FixedHeader::new(PacketType::Subscribe, body.len())?;
        let n = header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(n + body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_multiple_topics() {
        let packet = SubscribePacket::new(
            vec![
                SubscribeTopic::new("a/b", QoS::AtMostOnce).unwrap(),
                SubscribeTopic::new("a/+/c", QoS::ExactlyOnce).unwrap(),
            ],
            PacketId::new(10),
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        assert_eq!(SubscribePacket::decode_body(&mut ba, header).unwrap(), packet);
    }

    #[test]
    fn empty_topic_list_is_rejected() {
        let packet = SubscribePacket::new(vec![], PacketId::new(1));
        let mut buf = Vec::new();
        assert_eq!(
            packet.encode(&mut buf),
            Err(EncodeError::InvalidPacketType)
        );
    }

    #[test]
    fn reserved_qos_bits_rejected() {
        let mut body = Vec::new();
        PacketId::new(1).encode(&mut body).unwrap();
        encode_string(&mut body, "a/b").unwrap();
        body.push(0b0000_0100);
        let header = FixedHeader::new(PacketType::Subscribe, body.len()).unwrap();
        let mut ba = ByteArray::new(&body);
        assert_eq!(
            SubscribePacket::decode_body(&mut ba, header),
            Err(DecodeError::InvalidQoS)
        );
    }
}
