use crate::fcs;
use thiserror::Error;

/*
 * Flag | Address | Control | Protocol | Payload | FCS          | Flag
 * 0x7E |  0xFF   |  0x03   | 2B (BE)  |   nB    | 2B (LE)      | 0x7E
 */

pub const FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
pub const ESCAPE_XOR: u8 = 0x20;
pub const ADDRESS: u8 = 0xFF;
pub const CONTROL: u8 = 0x03;

/// Address, control and the two protocol bytes.
pub const HEADER_LEN: usize = 4;
pub const FCS_LEN: usize = 2;

/// Protocol field of a PPP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Internet Protocol, 0x0021.
    Ip,
    /// Link Control Protocol, 0xC021.
    Lcp,
    Unknown(u16),
}

impl Protocol {
    pub const IP: u16 = 0x0021;
    pub const LCP: u16 = 0xC021;
}

impl From<u16> for Protocol {
    fn from(value: u16) -> Self {
        match value {
            Self::IP => Self::Ip,
            Self::LCP => Self::Lcp,
            other => Self::Unknown(other),
        }
    }
}

impl From<Protocol> for u16 {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::Ip => Protocol::IP,
            Protocol::Lcp => Protocol::LCP,
            Protocol::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeframingError {
    #[error("frame is not enclosed in flags")]
    MissingFlag,
    #[error("frame too short")]
    TooShort,
    #[error("invalid address byte {0:#04x}")]
    InvalidAddress(u8),
    #[error("invalid control byte {0:#04x}")]
    InvalidControl(u8),
    #[error("fcs mismatch: computed {computed:#06x}, received {received:#06x}")]
    FcsMismatch { computed: u16, received: u16 },
}

pub fn needs_escape(byte: u8) -> bool {
    byte == FLAG || byte == ESCAPE
}

/// Replaces every flag and escape byte by the escape byte followed by the
/// original XOR 0x20.
pub fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        if needs_escape(byte) {
            escaped.push(ESCAPE);
            escaped.push(byte ^ ESCAPE_XOR);
        } else {
            escaped.push(byte);
        }
    }
    escaped
}

/// Reverses [`escape`]. A trailing escape byte with nothing after it is dropped.
pub fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut unescaped = Vec::with_capacity(bytes.len());
    let mut escaped = false;
    for &byte in bytes {
        if byte == ESCAPE {
            escaped = true;
        } else if escaped {
            unescaped.push(byte ^ ESCAPE_XOR);
            escaped = false;
        } else {
            unescaped.push(byte);
        }
    }
    unescaped
}

/// A complete PPP frame held in memory.
///
/// The link itself never builds one of these: the codec streams frames byte by
/// byte. This is the contiguous form used for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub protocol: Protocol,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(protocol: Protocol, payload: Vec<u8>) -> Self {
        Self { protocol, payload }
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        let [hi, lo] = u16::from(self.protocol).to_be_bytes();
        [ADDRESS, CONTROL, hi, lo]
    }

    pub fn fcs(&self) -> u16 {
        let mut digest = fcs::digest();
        digest.update(&self.header());
        digest.update(&self.payload);
        digest.finalize()
    }

    /// Converts the frame into its escaped wire form, flags included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut content = Vec::with_capacity(HEADER_LEN + self.payload.len() + FCS_LEN);
        content.extend_from_slice(&self.header());
        content.extend_from_slice(&self.payload);
        content.extend_from_slice(&self.fcs().to_le_bytes());

        let mut bytes = Vec::with_capacity(content.len() + 2);
        bytes.push(FLAG);
        bytes.extend(escape(&content));
        bytes.push(FLAG);
        bytes
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = DeframingError;

    /// Decodes one wire frame, opening and closing flag included.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let inner = match bytes {
            [FLAG, inner @ .., FLAG] => inner,
            _ => return Err(DeframingError::MissingFlag),
        };

        // Absorb repeated opening flags.
        let start = inner.iter().take_while(|&&b| b == FLAG).count();
        let content = unescape(&inner[start..]);

        if content.len() < HEADER_LEN + FCS_LEN {
            return Err(DeframingError::TooShort);
        }
        if content[0] != ADDRESS {
            return Err(DeframingError::InvalidAddress(content[0]));
        }
        if content[1] != CONTROL {
            return Err(DeframingError::InvalidControl(content[1]));
        }

        let (body, trailer) = content.split_at(content.len() - FCS_LEN);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        let computed = fcs::checksum(body);
        if computed != received {
            return Err(DeframingError::FcsMismatch { computed, received });
        }

        Ok(Frame {
            protocol: Protocol::from(u16::from_be_bytes([body[2], body[3]])),
            payload: body[HEADER_LEN..].to_vec(),
        })
    }
}
