// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{decode_string, encode_string, PacketId};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::topic::validate_topic_filter;

/// UNSUBSCRIBE, a client request to remove one or more topic filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsubscribePacket {
    packet_id: PacketId,
    topics: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub const fn new(topics: Vec<String>, packet_id: PacketId) -> Self {
        Self { packet_id, topics }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        _fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(ba)?;
        let mut topics = Vec::new();
        // The payload MUST contain at least one Topic Filter [MQTT-3.10.3-2].
        while ba.remaining_bytes() > 0 {
            let topic = decode_string(ba)?;
            validate_topic_filter(&topic)?;
            topics.push(topic);
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
        for topic in &self.topics {
            encode_string(&mut body, topic)?;
        }

        let header = FixedHeader::new(PacketType::Unsubscribe, body.len())?;
        let n = header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(n + body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let packet = UnsubscribePacket::new(
            vec!["a/b".to_string(), "c/#".to_string()],
            PacketId::new(3),
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        assert_eq!(
            UnsubscribePacket::decode_body(&mut ba, header).unwrap(),
            packet
        );
    }
}
