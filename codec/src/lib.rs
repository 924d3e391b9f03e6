// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Byte-exact MQTT 3.1.1 packet codec.
//!
//! [`decode_packet`] is the single entry point used by the broker and the
//! client: it consumes a byte buffer and returns either a decoded
//! [`Packet`] plus the number of bytes it occupied, or `None` if the
//! buffer is a proper prefix of a packet (the caller should read more
//! bytes and try again). It never blocks and performs no I/O.

mod base;
mod byte_array;
mod connect_ack_packet;
mod connect_flags;
mod connect_packet;
mod disconnect_packet;
mod error;
mod header;
mod ping_request_packet;
mod ping_response_packet;
mod protocol_level;
mod publish_ack_packet;
mod publish_complete_packet;
mod publish_packet;
mod publish_received_packet;
mod publish_release_packet;
mod subscribe_ack_packet;
mod subscribe_packet;
pub mod topic;
mod unsubscribe_ack_packet;
mod unsubscribe_packet;
mod var_int;

pub use base::{decode_binary, decode_string, encode_binary, encode_string, PacketId, QoS};
pub use connect_ack_packet::{ConnectAckPacket, ConnectReturnCode};
pub use connect_flags::ConnectFlags;
pub use connect_packet::ConnectPacket;
pub use disconnect_packet::DisconnectPacket;
pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, PacketType};
pub use ping_request_packet::PingRequestPacket;
pub use ping_response_packet::PingResponsePacket;
pub use protocol_level::ProtocolLevel;
pub use publish_ack_packet::PublishAckPacket;
pub use publish_complete_packet::PublishCompletePacket;
pub use publish_packet::PublishPacket;
pub use publish_received_packet::PublishReceivedPacket;
pub use publish_release_packet::PublishReleasePacket;
pub use subscribe_ack_packet::{SubscribeAck, SubscribeAckPacket};
pub use subscribe_packet::{SubscribePacket, SubscribeTopic};
pub use unsubscribe_ack_packet::UnsubscribeAckPacket;
pub use unsubscribe_packet::UnsubscribePacket;

use byte_array::ByteArray;

/// Maximum number of bytes a remaining-length field can describe.
pub const MAX_PACKET_LEN: usize = var_int::MAX_PACKET_LEN;

/// Any of the 14 MQTT 3.1.1 control packets.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnectAck(_) => PacketType::ConnectAck,
            Self::Publish(p) => PacketType::Publish {
                dup: p.dup(),
                qos: p.qos(),
                retain: p.retain(),
            },
            Self::PublishAck(_) => PacketType::PublishAck,
            Self::PublishReceived(_) => PacketType::PublishReceived,
            Self::PublishRelease(_) => PacketType::PublishRelease,
            Self::PublishComplete(_) => PacketType::PublishComplete,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubscribeAck(_) => PacketType::SubscribeAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Self::PingRequest(_) => PacketType::PingRequest,
            Self::PingResponse(_) => PacketType::PingResponse,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnectAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PublishAck(p) => p.encode(buf),
            Self::PublishReceived(p) => p.encode(buf),
            Self::PublishRelease(p) => p.encode(buf),
            Self::PublishComplete(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubscribeAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubscribeAck(p) => p.encode(buf),
            Self::PingRequest(p) => p.encode(buf),
            Self::PingResponse(p) => p.encode(buf),
            Self::Disconnect(p) => p.encode(buf),
        }
    }
}

macro_rules! from_packet {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Packet {
            fn from(p: $ty) -> Self {
                Self::$variant(p)
            }
        }
    };
}

from_packet!(Connect, ConnectPacket);
from_packet!(ConnectAck, ConnectAckPacket);
from_packet!(Publish, PublishPacket);
from_packet!(PublishAck, PublishAckPacket);
from_packet!(PublishReceived, PublishReceivedPacket);
from_packet!(PublishRelease, PublishReleasePacket);
from_packet!(PublishComplete, PublishCompletePacket);
from_packet!(Subscribe, SubscribePacket);
from_packet!(SubscribeAck, SubscribeAckPacket);
from_packet!(Unsubscribe, UnsubscribePacket);
from_packet!(UnsubscribeAck, UnsubscribeAckPacket);
from_packet!(PingRequest, PingRequestPacket);
from_packet!(PingResponse, PingResponsePacket);
from_packet!(Disconnect, DisconnectPacket);

/// Decodes a single packet from the front of `buf`.
///
/// Returns:
/// * `Ok(Some((packet, consumed)))` if a complete packet was parsed;
///   `consumed` bytes should be dropped from the caller's buffer.
/// * `Ok(None)` if `buf` is a proper prefix of a packet: read more bytes.
/// * `Err(_)` if `buf` contains a malformed packet.
pub fn decode_packet(buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
    let mut ba = ByteArray::new(buf);
    let fixed_header = match FixedHeader::decode(&mut ba) {
        Ok(h) => h,
        Err(DecodeError::IncompletePacket) => return Ok(None),
        Err(e) => return Err(e),
    };

    let total_len = fixed_header.bytes() + fixed_header.remaining_length();
    if buf.len() < total_len {
        return Ok(None);
    }

    // Re-decode against a slice truncated to exactly this packet so a
    // packet's own decoder can't accidentally read into the next packet.
    let packet_buf = &buf[..total_len];
    let mut ba = ByteArray::new(packet_buf);

    let packet = match fixed_header.packet_type() {
        PacketType::Connect => Packet::Connect(ConnectPacket::decode_body(&mut ba, fixed_header)?),
        PacketType::ConnectAck => {
            Packet::ConnectAck(ConnectAckPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::Publish { .. } => {
            Packet::Publish(PublishPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::PublishAck => {
            Packet::PublishAck(PublishAckPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::PublishReceived => {
            Packet::PublishReceived(PublishReceivedPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::PublishRelease => {
            Packet::PublishRelease(PublishReleasePacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::PublishComplete => {
            Packet::PublishComplete(PublishCompletePacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::Subscribe => {
            Packet::Subscribe(SubscribePacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::SubscribeAck => {
            Packet::SubscribeAck(SubscribeAckPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::Unsubscribe => {
            Packet::Unsubscribe(UnsubscribePacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::UnsubscribeAck => {
            Packet::UnsubscribeAck(UnsubscribeAckPacket::decode_body(&mut ba, fixed_header)?)
        }
        PacketType::PingRequest => Packet::PingRequest(PingRequestPacket),
        PacketType::PingResponse => Packet::PingResponse(PingResponsePacket),
        PacketType::Disconnect => Packet::Disconnect(DisconnectPacket),
    };

    Ok(Some((packet, total_len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn need_more_data_on_prefix() {
        let packet = Packet::PingRequest(PingRequestPacket);
        let mut full = Vec::new();
        packet.encode(&mut full).unwrap();

        for split in 0..full.len() {
            let prefix = &full[..split];
            assert_eq!(decode_packet(prefix).unwrap(), None, "split at {split}");
        }
        let (decoded, consumed) = decode_packet(&full).unwrap().unwrap();
        assert_eq!(consumed, full.len());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn partial_read_then_concat_across_all_packet_kinds() {
        let packets = vec![
            Packet::Connect(ConnectPacket::new("client-1", true, 30).unwrap()),
            Packet::Publish(PublishPacket::new("a/b", QoS::AtLeastOnce, b"hi", false).unwrap()),
            Packet::Subscribe(SubscribePacket::new(
                vec![SubscribeTopic::new("a/+", QoS::AtLeastOnce).unwrap()],
                PacketId::new(7),
            )),
            Packet::Disconnect(DisconnectPacket),
        ];

        for packet in packets {
            let mut full = Vec::new();
            packet.encode(&mut full).unwrap();
            for split in 0..full.len() {
                assert_eq!(decode_packet(&full[..split]).unwrap(), None);
            }
            let (decoded, consumed) = decode_packet(&full).unwrap().unwrap();
            assert_eq!(consumed, full.len());
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn two_packets_back_to_back_only_consumes_first() {
        let a = Packet::PingRequest(PingRequestPacket);
        let b = Packet::Disconnect(DisconnectPacket);
        let mut buf = Vec::new();
        a.encode(&mut buf).unwrap();
        let split = buf.len();
        b.encode(&mut buf).unwrap();

        let (decoded, consumed) = decode_packet(&buf).unwrap().unwrap();
        assert_eq!(consumed, split);
        assert_eq!(decoded, a);
    }
}
