// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::error::DecodeError;

/// Protocol version named in the CONNECT packet's variable header.
///
/// Only `V311` is accepted by this broker; `V31` and `V5` are recognized
/// purely so CONNECT can be rejected with `UnacceptableProtocolVersion`
/// rather than `MalformedPacket`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ProtocolLevel {
    V31 = 3,
    #[default]
    V311 = 4,
    V5 = 5,
}

impl TryFrom<u8> for ProtocolLevel {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            3 => Ok(Self::V31),
            4 => Ok(Self::V311),
            5 => Ok(Self::V5),
            _ => Err(DecodeError::InvalidProtocolLevel),
        }
    }
}
