use super::LcpError;

/*
 * Code | Identifier | Length   | Data
 *  1B  |     1B     | 2B (BE)  | Length - 4 bytes
 */

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    ConfigureRequest = 1,
    ConfigureAck = 2,
    ConfigureNak = 3,
    ConfigureReject = 4,
    TerminateRequest = 5,
    TerminateAck = 6,
    CodeReject = 7,
    ProtocolReject = 8,
    EchoRequest = 9,
    EchoReply = 10,
    DiscardRequest = 11,
}

impl TryFrom<u8> for Code {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Code::ConfigureRequest,
            2 => Code::ConfigureAck,
            3 => Code::ConfigureNak,
            4 => Code::ConfigureReject,
            5 => Code::TerminateRequest,
            6 => Code::TerminateAck,
            7 => Code::CodeReject,
            8 => Code::ProtocolReject,
            9 => Code::EchoRequest,
            10 => Code::EchoReply,
            11 => Code::DiscardRequest,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw code byte, kept as is so unknown codes can still be reported.
    pub code: u8,
    pub identifier: u8,
    /// Whole packet length, header included.
    pub length: u16,
}

impl Header {
    pub fn new(code: Code, identifier: u8, length: u16) -> Self {
        Self {
            code: code as u8,
            identifier,
            length,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, LcpError> {
        match bytes {
            [code, identifier, hi, lo, ..] => Ok(Self {
                code: *code,
                identifier: *identifier,
                length: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => Err(LcpError::Truncated { length: bytes.len() }),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [hi, lo] = self.length.to_be_bytes();
        [self.code, self.identifier, hi, lo]
    }
}
