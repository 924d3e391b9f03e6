// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use byteorder::{BigEndian, WriteBytesExt};

use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// Quality of Service level of a PUBLISH or a subscription.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    #[must_use]
    pub const fn min(self, other: QoS) -> QoS {
        if (self as u8) < (other as u8) {
            self
        } else {
            other
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}

/// A 16-bit packet identifier, present on every PUBLISH with QoS > 0 and on
/// every ack/release packet. `0` is reserved and never allocated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u16);

impl PacketId {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        2
    }

    pub fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Ok(Self(ba.read_u16()?))
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.write_u16::<BigEndian>(self.0)
            .expect("writing to a Vec never fails");
        Ok(Self::bytes())
    }
}

impl From<u16> for PacketId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Encodes a length-prefixed UTF-8 string field (topic names, client ids,
/// user name, ...).
pub fn encode_string(buf: &mut Vec<u8>, s: &str) -> Result<usize, EncodeError> {
    if s.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyData);
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = s.len() as u16;
    buf.write_u16::<BigEndian>(len)
        .expect("writing to a Vec never fails");
    buf.extend_from_slice(s.as_bytes());
    Ok(2 + s.len())
}

pub fn decode_string(ba: &mut ByteArray) -> Result<String, DecodeError> {
    let len = ba.read_u16()? as usize;
    ba.read_string(len)
}

/// Encodes a length-prefixed binary field (PUBLISH payload is *not*
/// length-prefixed; this is for CONNECT's will message / password fields).
pub fn encode_binary(buf: &mut Vec<u8>, data: &[u8]) -> Result<usize, EncodeError> {
    if data.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyData);
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u16;
    buf.write_u16::<BigEndian>(len)
        .expect("writing to a Vec never fails");
    buf.extend_from_slice(data);
    Ok(2 + data.len())
}

pub fn decode_binary(ba: &mut ByteArray) -> Result<Vec<u8>, DecodeError> {
    let len = ba.read_u16()? as usize;
    Ok(ba.read_bytes(len)?.to_vec())
}
