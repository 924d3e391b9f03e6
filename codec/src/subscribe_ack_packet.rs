// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{PacketId, QoS};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};

/// Per-filter outcome reported in a SUBACK, one entry per SUBSCRIBE topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeAck {
    /// Subscription granted at this QoS (the broker's max supported QoS for
    /// this filter, possibly downgraded from what the client requested).
    Success(QoS),
    /// The subscription request at this index failed.
    Failure,
}

impl SubscribeAck {
    #[must_use]
    const fn to_byte(self) -> u8 {
        match self {
            Self::Success(qos) => qos as u8,
            Self::Failure => 0x80,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        if byte == 0x80 {
            Ok(Self::Failure)
        } else {
            Ok(Self::Success(QoS::try_from(byte)?))
        }
    }
}

/// SUBACK, the broker's per-filter response to a SUBSCRIBE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    acks: Vec<SubscribeAck>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub const fn new(acks: Vec<SubscribeAck>, packet_id: PacketId) -> Self {
        Self { packet_id, acks }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn acks(&self) -> &[SubscribeAck] {
        &self.acks
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        _fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(ba)?;
        let mut acks = Vec::new();
        while ba.remaining_bytes() > 0 {
            acks.push(SubscribeAck::from_byte(ba.read_byte()?)?);
        }
        Ok(Self { packet_id, acks })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut body = Vec::new();
        self.packet_id.encode(&mut body)?;
        for ack in &self.acks {
            body.push(ack.to_byte());
        }

        let header = FixedHeader::new(PacketType::SubscribeAck, body.len())?;
        let n = header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(n + body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mixed_results() {
        let packet = SubscribeAckPacket::new(
            vec![
                SubscribeAck::Success(QoS::AtLeastOnce),
                SubscribeAck::Failure,
                SubscribeAck::Success(QoS::AtMostOnce),
            ],
            PacketId::new(5),
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        assert_eq!(
            SubscribeAckPacket::decode_body(&mut ba, header).unwrap(),
            packet
        );
    }
}
