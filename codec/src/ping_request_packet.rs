// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::EncodeError;
use crate::header::{FixedHeader, PacketType};

/// PINGREQ, sent by the client to keep the connection alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingRequestPacket;

impl PingRequestPacket {
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let header = FixedHeader::new(PacketType::PingRequest, 0)?;
        header.encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_array::ByteArray;

    #[test]
    fn encodes_to_two_bytes() {
        let mut buf = Vec::new();
        PingRequestPacket.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0b1100_0000, 0x00]);
        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        assert_eq!(header.packet_type(), PacketType::PingRequest);
    }
}
