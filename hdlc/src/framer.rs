//! Transmit state machine.
//!
//! One byte goes out per transmit-complete event. The payload is read in place
//! from a segment chain; the chain must stay untouched until the framer is
//! back to [`TxState::Idle`].

use crate::chain::{SegmentId, SegmentPool};
use crate::fcs;
use crate::frame::{ADDRESS, CONTROL, ESCAPE, ESCAPE_XOR, FLAG, Protocol, needs_escape};
use crate::transport::Transport;
use crc::Digest;
use log::{debug, trace};
use thiserror::Error;

/// Last field handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Flag,
    Address,
    Control,
    ProtocolHi,
    ProtocolLo,
    Data,
    FcsLo,
    FcsHi,
    ClosingFlag,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransmitError {
    #[error("a frame is already being transmitted")]
    Busy,
    #[error("nothing to transmit: chain is empty")]
    EmptyChain,
}

pub struct Framer {
    state: TxState,
    chain: Option<SegmentId>,
    read_index: usize,
    protocol: u16,
    fcs: Digest<'static, u16>,
    fcs_out: u16,
    pending_escape: Option<u8>,
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("state", &self.state)
            .field("chain", &self.chain)
            .field("read_index", &self.read_index)
            .field("protocol", &self.protocol)
            .field("pending_escape", &self.pending_escape)
            .finish_non_exhaustive()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: TxState::Idle,
            chain: None,
            read_index: 0,
            protocol: 0,
            fcs: fcs::digest(),
            fcs_out: 0,
            pending_escape: None,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != TxState::Idle
    }

    /// Latches the chain and sends the opening flag.
    pub fn start<T: Transport>(
        &mut self,
        protocol: Protocol,
        chain: SegmentId,
        pool: &SegmentPool,
        transport: &mut T,
    ) -> Result<(), TransmitError> {
        if self.is_busy() {
            return Err(TransmitError::Busy);
        }
        if pool.tot_length(chain) == 0 {
            return Err(TransmitError::EmptyChain);
        }

        self.protocol = protocol.into();
        self.chain = Some(chain);
        self.read_index = 0;
        self.pending_escape = None;
        self.state = TxState::Flag;

        debug!(
            "transmitting {} byte frame for protocol {:#06x}",
            pool.tot_length(chain),
            self.protocol
        );
        transport.transmit_byte(FLAG);
        Ok(())
    }

    /// Sends the next byte, or nothing once the closing flag has gone out.
    /// Returns `true` when this call completed a frame.
    pub fn on_byte_transmitted<T: Transport>(&mut self, pool: &SegmentPool, transport: &mut T) -> bool {
        if let Some(byte) = self.pending_escape.take() {
            transport.transmit_byte(byte ^ ESCAPE_XOR);
            return false;
        }

        match self.state {
            TxState::Idle => return false,
            TxState::Flag => {
                self.fcs = fcs::digest();
                self.send(ADDRESS, transport);
                self.state = TxState::Address;
            }
            TxState::Address => {
                self.send(CONTROL, transport);
                self.state = TxState::Control;
            }
            TxState::Control => {
                self.send(self.protocol.to_be_bytes()[0], transport);
                self.state = TxState::ProtocolHi;
            }
            TxState::ProtocolHi => {
                self.send(self.protocol.to_be_bytes()[1], transport);
                self.state = TxState::ProtocolLo;
            }
            TxState::ProtocolLo | TxState::Data => match self.next_payload_byte(pool) {
                Some(byte) => {
                    self.send(byte, transport);
                    self.state = TxState::Data;
                }
                None => {
                    self.fcs_out = std::mem::replace(&mut self.fcs, fcs::digest()).finalize();
                    self.send(self.fcs_out.to_le_bytes()[0], transport);
                    self.state = TxState::FcsLo;
                }
            },
            TxState::FcsLo => {
                self.send(self.fcs_out.to_le_bytes()[1], transport);
                self.state = TxState::FcsHi;
            }
            TxState::FcsHi => {
                transport.transmit_byte(FLAG);
                self.state = TxState::ClosingFlag;
            }
            TxState::ClosingFlag => {
                self.chain = None;
                self.state = TxState::Idle;
                return true;
            }
        }
        false
    }

    // Accumulates the FCS over the unescaped byte and escapes it on the wire.
    fn send<T: Transport>(&mut self, byte: u8, transport: &mut T) {
        self.fcs.update(&[byte]);
        trace!("tx {byte:#04x} in {:?}", self.state);

        if needs_escape(byte) {
            self.pending_escape = Some(byte);
            transport.transmit_byte(ESCAPE);
        } else {
            transport.transmit_byte(byte);
        }
    }

    fn next_payload_byte(&mut self, pool: &SegmentPool) -> Option<u8> {
        let mut position = self.chain;
        while let Some(id) = position {
            let data = pool.data(id);
            if self.read_index < data.len() {
                let byte = data[self.read_index];
                self.read_index += 1;
                return Some(byte);
            }
            self.read_index = 0;
            position = pool.next(id);
            self.chain = position;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn drive(framer: &mut Framer, pool: &SegmentPool, wire: &mut Vec<u8>) {
        while framer.is_busy() {
            framer.on_byte_transmitted(pool, wire);
        }
    }

    #[test]
    fn single_segment_matches_reference_encoding() {
        let mut pool = SegmentPool::with_capacity(1);
        let chain = pool.create(vec![1, 2, 3]).unwrap();
        let mut framer = Framer::new();
        let mut wire = Vec::new();

        framer.start(Protocol::Ip, chain, &pool, &mut wire).unwrap();
        drive(&mut framer, &pool, &mut wire);

        assert_eq!(wire, Frame::new(Protocol::Ip, vec![1, 2, 3]).to_bytes());
        assert_eq!(framer.state(), TxState::Idle);
    }

    #[test]
    fn walks_chain_skipping_empty_segments() {
        let mut pool = SegmentPool::with_capacity(3);
        let head = pool.create(vec![0x7E, 0x01]).unwrap();
        let empty = pool.create(Vec::new()).unwrap();
        let tail = pool.create(vec![0x7D]).unwrap();
        pool.insert_at_end(head, empty);
        pool.insert_at_end(head, tail);

        let mut framer = Framer::new();
        let mut wire = Vec::new();
        framer.start(Protocol::Lcp, head, &pool, &mut wire).unwrap();
        drive(&mut framer, &pool, &mut wire);

        assert_eq!(wire, Frame::new(Protocol::Lcp, vec![0x7E, 0x01, 0x7D]).to_bytes());
    }

    #[test]
    fn escape_is_followed_by_transformed_byte() {
        let mut pool = SegmentPool::with_capacity(1);
        let chain = pool.create(vec![0x7E]).unwrap();
        let mut framer = Framer::new();
        let mut wire = Vec::new();

        framer.start(Protocol::Ip, chain, &pool, &mut wire).unwrap();
        drive(&mut framer, &pool, &mut wire);

        assert_eq!(&wire[..7], &[FLAG, 0xFF, 0x03, 0x00, 0x21, 0x7D, 0x5E]);
    }

    #[test]
    fn busy_while_in_flight() {
        let mut pool = SegmentPool::with_capacity(1);
        let chain = pool.create(vec![1]).unwrap();
        let mut framer = Framer::new();
        let mut wire = Vec::new();

        framer.start(Protocol::Ip, chain, &pool, &mut wire).unwrap();
        assert_eq!(
            framer.start(Protocol::Ip, chain, &pool, &mut wire),
            Err(TransmitError::Busy)
        );
        assert_eq!(wire, vec![FLAG]);
    }

    #[test]
    fn empty_chain_is_refused() {
        let mut pool = SegmentPool::with_capacity(1);
        let chain = pool.create(Vec::new()).unwrap();
        let mut framer = Framer::new();
        let mut wire = Vec::new();

        assert_eq!(
            framer.start(Protocol::Ip, chain, &pool, &mut wire),
            Err(TransmitError::EmptyChain)
        );
        assert!(wire.is_empty());
        assert!(!framer.is_busy());
    }

    #[test]
    fn completion_reported_once() {
        let mut pool = SegmentPool::with_capacity(1);
        let chain = pool.create(vec![1]).unwrap();
        let mut framer = Framer::new();
        let mut wire = Vec::new();
        framer.start(Protocol::Ip, chain, &pool, &mut wire).unwrap();

        let mut completions = 0;
        for _ in 0..32 {
            if framer.on_byte_transmitted(&pool, &mut wire) {
                completions += 1;
            }
        }

        assert_eq!(completions, 1);
        assert_eq!(wire.last(), Some(&FLAG));
    }

    #[test]
    fn back_to_back_frames_carry_good_fcs() {
        let mut pool = SegmentPool::with_capacity(2);
        let first = pool.create(vec![0x7D, 0x10, 0x7E]).unwrap();
        let second = pool.create(vec![0xC0, 0x21, 0x00]).unwrap();
        let mut framer = Framer::new();

        for chain in [first, second] {
            let mut wire = Vec::new();
            framer.start(Protocol::Lcp, chain, &pool, &mut wire).unwrap();
            drive(&mut framer, &pool, &mut wire);

            let body = crate::frame::unescape(&wire[1..wire.len() - 1]);
            assert!(fcs::is_good(&body), "bad fcs on {wire:02x?}");
        }
    }
}
