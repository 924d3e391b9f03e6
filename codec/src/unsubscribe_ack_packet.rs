// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::PacketId;
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};

/// UNSUBACK, the broker's acknowledgement of an UNSUBSCRIBE.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub const fn new(packet_id: PacketId) -> Self {
        Self { packet_id }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        _fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            packet_id: PacketId::decode(ba)?,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let header = FixedHeader::new(PacketType::UnsubscribeAck, PacketId::bytes())?;
        let n = header.encode(buf)?;
        self.packet_id.encode(buf)?;
        Ok(n + PacketId::bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let packet = UnsubscribeAckPacket::new(PacketId::new(3));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        assert_eq!(
            UnsubscribeAckPacket::decode_body(&mut ba, header).unwrap(),
            packet
        );
    }
}
