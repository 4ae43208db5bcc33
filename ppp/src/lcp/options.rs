//! LCP configuration options.
//!
//! Options are type-length-value records parsed in place over a byte slice;
//! the length byte covers the type and length bytes themselves.

use super::LcpError;

/// Type and length bytes.
pub const OPTION_HEADER_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Mru,
    Accm,
    AuthProtocol,
    MagicNumber,
    ProtocolCompression,
    AddressControlCompression,
    Callback,
    Unknown(u8),
}

impl From<u8> for OptionType {
    fn from(value: u8) -> Self {
        match value {
            1 => OptionType::Mru,
            2 => OptionType::Accm,
            3 => OptionType::AuthProtocol,
            5 => OptionType::MagicNumber,
            7 => OptionType::ProtocolCompression,
            8 => OptionType::AddressControlCompression,
            13 => OptionType::Callback,
            other => OptionType::Unknown(other),
        }
    }
}

impl From<OptionType> for u8 {
    fn from(value: OptionType) -> Self {
        match value {
            OptionType::Mru => 1,
            OptionType::Accm => 2,
            OptionType::AuthProtocol => 3,
            OptionType::MagicNumber => 5,
            OptionType::ProtocolCompression => 7,
            OptionType::AddressControlCompression => 8,
            OptionType::Callback => 13,
            OptionType::Unknown(other) => other,
        }
    }
}

impl OptionType {
    /// Data length of the options this node accepts.
    fn accepted_data_len(self) -> Option<usize> {
        match self {
            OptionType::Mru => Some(2),
            OptionType::Accm | OptionType::MagicNumber => Some(4),
            _ => None,
        }
    }
}

/// One option borrowed from a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcpOption<'a> {
    pub kind: OptionType,
    raw: &'a [u8],
}

impl<'a> LcpOption<'a> {
    /// The whole record, type and length bytes included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn data(&self) -> &'a [u8] {
        &self.raw[OPTION_HEADER_LEN..]
    }

    pub fn value_u16(&self) -> Option<u16> {
        match self.data() {
            [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    pub fn value_u32(&self) -> Option<u32> {
        self.data().try_into().ok().map(u32::from_be_bytes)
    }

    /// Options this node never agrees to: anything other than MRU, ACCM and
    /// magic number, or one of those with a wrong length.
    pub fn is_refused(&self) -> bool {
        match self.kind.accepted_data_len() {
            Some(len) => self.data().len() != len,
            None => true,
        }
    }
}

/// Iterator over the options of a Configure-* packet body.
///
/// Yields an error and stops at the first record whose length byte does not
/// fit.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Options<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = Result<LcpOption<'a>, LcpError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.bytes[self.offset..];
        if rest.is_empty() {
            return None;
        }

        let offset = self.offset;
        let length = match rest {
            [_, length, ..] => usize::from(*length),
            _ => 0,
        };
        if length < OPTION_HEADER_LEN || length > rest.len() {
            self.offset = self.bytes.len();
            return Some(Err(LcpError::MalformedOption { offset }));
        }

        self.offset += length;
        Some(Ok(LcpOption {
            kind: OptionType::from(rest[0]),
            raw: &rest[..length],
        }))
    }
}

/// Appends option records to a fixed buffer.
#[derive(Debug)]
pub struct OptionWriter<'a> {
    buffer: &'a mut [u8],
    len: usize,
}

impl<'a> OptionWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, kind: OptionType, data: &[u8]) -> Result<(), LcpError> {
        let length = OPTION_HEADER_LEN + data.len();
        let Ok(length_byte) = u8::try_from(length) else {
            return Err(LcpError::TooLarge {
                length,
                capacity: usize::from(u8::MAX),
            });
        };

        self.reserve(length)?;
        self.buffer[self.len] = kind.into();
        self.buffer[self.len + 1] = length_byte;
        self.buffer[self.len + OPTION_HEADER_LEN..self.len + length].copy_from_slice(data);
        self.len += length;
        Ok(())
    }

    /// Copies already encoded records.
    pub fn push_raw(&mut self, raw: &[u8]) -> Result<(), LcpError> {
        self.reserve(raw.len())?;
        self.buffer[self.len..self.len + raw.len()].copy_from_slice(raw);
        self.len += raw.len();
        Ok(())
    }

    fn reserve(&self, length: usize) -> Result<(), LcpError> {
        if self.len + length > self.buffer.len() {
            return Err(LcpError::TooLarge {
                length: self.len + length,
                capacity: self.buffer.len(),
            });
        }
        Ok(())
    }
}
