// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::error::DecodeError;

/// A read-only cursor over a byte slice used by every `decode()` impl.
///
/// Running past the end of `data` is reported as
/// [`DecodeError::IncompletePacket`] rather than a hard parse failure, so
/// callers can tell "not enough bytes yet" apart from "malformed packet".
pub struct ByteArray<'a> {
    offset: usize,
    data: &'a [u8],
}

impl<'a> ByteArray<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        ByteArray { offset: 0, data }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.data.len() - self.offset
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if self.offset >= self.data.len() {
            return Err(DecodeError::IncompletePacket);
        }
        let b = self.data[self.offset];
        self.offset += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::IncompletePacket)?;
        if end > self.data.len() {
            return Err(DecodeError::IncompletePacket);
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.read_bytes(len)?;
        let s = String::from_utf8(bytes.to_vec())?;
        if s.contains('\u{0}') {
            return Err(DecodeError::InvalidString);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_is_incomplete() {
        let buf = [0x01, 0x02];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ba.read_byte(), Ok(0x01));
        assert_eq!(ba.read_byte(), Ok(0x02));
        assert_eq!(ba.read_byte(), Err(DecodeError::IncompletePacket));
    }

    #[test]
    fn read_string_rejects_null_byte() {
        let buf = [0x00, 0x01, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ba.read_string(1), Err(DecodeError::InvalidString));
    }
}
