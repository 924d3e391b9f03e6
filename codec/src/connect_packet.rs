// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{decode_binary, decode_string, encode_binary, encode_string, QoS};
use crate::byte_array::ByteArray;
use crate::connect_flags::ConnectFlags;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};
use crate::protocol_level::ProtocolLevel;

const PROTOCOL_NAME: &str = "MQTT";

/// CONNECT, sent once by the client immediately after the transport opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_level: ProtocolLevel,
    connect_flags: ConnectFlags,
    keep_alive: u16,
    client_id: String,
    will_topic: Option<String>,
    will_message: Vec<u8>,
    username: Option<String>,
    password: Vec<u8>,
}

impl ConnectPacket {
    /// Builds a CONNECT with no will, no credentials.
    ///
    /// # Errors
    /// Returns an error if `client_id` is longer than 23 bytes is not
    /// enforced here (brokers may allow longer ids); this only rejects
    /// client ids containing forbidden characters is *not* checked -- MQTT
    /// 3.1.1 allows any UTF-8 client id. The only real failure mode is an
    /// empty id combined with `clean_session == false`.
    pub fn new(client_id: &str, clean_session: bool, keep_alive: u16) -> Result<Self, EncodeError> {
        if client_id.is_empty() && !clean_session {
            return Err(EncodeError::InvalidPacketType);
        }
        Ok(Self {
            protocol_level: ProtocolLevel::V311,
            connect_flags: ConnectFlags {
                clean_session,
                ..ConnectFlags::default()
            },
            keep_alive,
            client_id: client_id.to_string(),
            will_topic: None,
            will_message: Vec::new(),
            username: None,
            password: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_will(mut self, topic: &str, message: &[u8], qos: QoS, retain: bool) -> Self {
        self.connect_flags.has_will = true;
        self.connect_flags.will_qos = qos;
        self.connect_flags.will_retain = retain;
        self.will_topic = Some(topic.to_string());
        self.will_message = message.to_vec();
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &[u8]) -> Self {
        self.connect_flags.has_username = true;
        self.username = Some(username.to_string());
        if !password.is_empty() {
            self.connect_flags.has_password = true;
            self.password = password.to_vec();
        }
        self
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    #[must_use]
    pub const fn connect_flags(&self) -> &ConnectFlags {
        &self.connect_flags
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&str> {
        self.will_topic.as_deref()
    }

    #[must_use]
    pub fn will_message(&self) -> &[u8] {
        &self.will_message
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    pub(crate) fn decode_body(
        ba: &mut ByteArray,
        _fixed_header: FixedHeader,
    ) -> Result<Self, DecodeError> {
        let name_len = ba.read_u16()? as usize;
        let name = ba.read_string(name_len)?;
        if name != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }

        let level_byte = ba.read_byte()?;
        let protocol_level = ProtocolLevel::try_from(level_byte)?;

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let client_id_len = ba.read_u16()? as usize;
        let client_id = ba.read_string(client_id_len)?;
        // A Server MAY allow a Client to supply a ClientId that has a length
        // of zero bytes ... If it does so, it MUST also treat this as a
        // special case and assign a unique ClientId to that Client
        // [MQTT-3.1.3-6]. A zero-length ClientId requires CleanSession set
        // to 1 [MQTT-3.1.3-8].
        if client_id.is_empty() && !connect_flags.clean_session {
            return Err(DecodeError::InvalidClientId);
        }

        let (will_topic, will_message) = if connect_flags.has_will {
            let topic = decode_string(ba)?;
            let message = decode_binary(ba)?;
            (Some(topic), message)
        } else {
            (None, Vec::new())
        };

        let username = if connect_flags.has_username {
            Some(decode_string(ba)?)
        } else {
            None
        };

        let password = if connect_flags.has_password {
            decode_binary(ba)?
        } else {
            Vec::new()
        };

        Ok(Self {
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            username,
            password,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut body = Vec::new();
        encode_string(&mut body, PROTOCOL_NAME)?;
        body.push(self.protocol_level as u8);
        self.connect_flags.encode(&mut body)?;
        body.extend_from_slice(&self.keep_alive.to_be_bytes());
        encode_string(&mut body, &self.client_id)?;

        if self.connect_flags.has_will {
            let topic = self
                .will_topic
                .as_deref()
                .ok_or(EncodeError::InvalidPacketType)?;
            encode_string(&mut body, topic)?;
            encode_binary(&mut body, &self.will_message)?;
        }
        if self.connect_flags.has_username {
            let username = self
                .username
                .as_deref()
                .ok_or(EncodeError::InvalidPacketType)?;
            encode_string(&mut body, username)?;
        }
        if self.connect_flags.has_password {
            encode_binary(&mut body, &self.password)?;
        }

        let header = FixedHeader::new(PacketType::Connect, body.len())?;
        let n = header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(n + body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_minimal() {
        let packet = ConnectPacket::new("client-1", true, 60).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        let decoded = ConnectPacket::decode_body(&mut ba, header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn roundtrip_with_will_and_credentials() {
        let packet = ConnectPacket::new("client-2", false, 30)
            .unwrap()
            .with_will("a/lwt", b"bye", QoS::AtLeastOnce, true)
            .with_credentials("alice", b"hunter2");
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut ByteArray::new(&buf)).unwrap();
        let mut ba = ByteArray::new(&buf[header.bytes()..]);
        let decoded = ConnectPacket::decode_body(&mut ba, header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn empty_client_id_requires_clean_session() {
        assert_eq!(
            ConnectPacket::new("", false, 60),
            Err(EncodeError::InvalidPacketType)
        );
    }

    #[test]
    fn rejects_wrong_protocol_name() {
        let mut body = Vec::new();
        encode_string(&mut body, "MQTX").unwrap();
        body.push(4);
        ConnectFlags::default().encode(&mut body).unwrap();
        body.extend_from_slice(&60u16.to_be_bytes());
        encode_string(&mut body, "c").unwrap();

        let header = FixedHeader::new(PacketType::Connect, body.len()).unwrap();
        let mut ba = ByteArray::new(&body);
        assert_eq!(
            ConnectPacket::decode_body(&mut ba, header),
            Err(DecodeError::InvalidProtocolName)
        );
    }
}
