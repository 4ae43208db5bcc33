//! Receive state machine.
//!
//! Fed one raw byte at a time from the transport's receive event. Bytes are
//! unescaped on the fly, the header is checked in place and the payload plus
//! the trailing FCS is written straight into the queue's current write slot.

use crate::chain::{SegmentId, SegmentPool};
use crate::fcs;
use crate::frame::{ADDRESS, CONTROL, ESCAPE, ESCAPE_XOR, FCS_LEN, FLAG, Protocol};
use crate::queue::PacketQueue;
use log::{debug, trace, warn};

/// Position inside the frame, named after the last field received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    WaitingForSync,
    Flag,
    Address,
    Control,
    ProtocolHi,
    ProtocolLo,
    Data,
    /// MTU reached: the byte after the last payload byte is the low FCS byte.
    FcsLo,
    /// Explicit FCS matched, a closing flag must follow.
    FcsHi,
}

/// Why a frame was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Address or control byte did not match.
    OutOfSync,
    /// Closing flag before a complete header and FCS.
    TooShort,
    FcsMismatch,
    /// More bytes than MTU + FCS before the closing flag.
    Oversized,
    /// Every receive slot was still pending.
    QueueFull,
}

/// Outcome of one receive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    Pending,
    Frame(Protocol),
    Discarded(Discard),
}

#[derive(Debug)]
pub struct Deframer {
    state: RxState,
    escaped: bool,
    protocol: u16,
    target: Option<SegmentId>,
    write_index: usize,
    fcs_computed: u16,
    fcs_received: u16,
    mtu: usize,
}

impl Deframer {
    pub fn new(mtu: usize) -> Self {
        Self {
            state: RxState::WaitingForSync,
            escaped: false,
            protocol: 0,
            target: None,
            write_index: 0,
            fcs_computed: 0,
            fcs_received: 0,
            mtu,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// The caller keeps `mtu + 2` within the receive slot capacity.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    pub fn push_byte(&mut self, raw: u8, pool: &mut SegmentPool, queue: &mut PacketQueue) -> RxEvent {
        if raw == ESCAPE {
            self.escaped = true;
            return RxEvent::Pending;
        }

        let is_flag = !self.escaped && raw == FLAG;
        let byte = if self.escaped { raw ^ ESCAPE_XOR } else { raw };
        self.escaped = false;

        trace!("rx {byte:#04x} in {:?}", self.state);

        if is_flag {
            let event = match self.state {
                RxState::WaitingForSync | RxState::Flag => RxEvent::Pending,
                RxState::Address | RxState::Control | RxState::ProtocolHi | RxState::ProtocolLo => {
                    RxEvent::Discarded(Discard::TooShort)
                }
                RxState::Data | RxState::FcsLo => self.close(pool, queue),
                RxState::FcsHi => self.commit(self.write_index - FCS_LEN, pool, queue),
            };
            self.state = RxState::Flag;
            return event;
        }

        match self.state {
            RxState::WaitingForSync => RxEvent::Pending,
            RxState::Flag => self.expect_byte(byte, ADDRESS, RxState::Address),
            RxState::Address => self.expect_byte(byte, CONTROL, RxState::Control),
            RxState::Control => {
                self.protocol = u16::from(byte) << 8;
                self.state = RxState::ProtocolHi;
                RxEvent::Pending
            }
            RxState::ProtocolHi => {
                self.protocol |= u16::from(byte);
                self.state = RxState::ProtocolLo;
                RxEvent::Pending
            }
            RxState::ProtocolLo => {
                self.target = queue.write_slot();
                self.write_index = 0;
                self.store(byte, pool);
                self.state = RxState::Data;
                RxEvent::Pending
            }
            RxState::Data if self.write_index < self.mtu => {
                self.store(byte, pool);
                RxEvent::Pending
            }
            RxState::Data => {
                // MTU reached without a closing flag: the next two bytes are the FCS.
                self.fcs_computed = self.payload_fcs(self.write_index, pool);
                self.fcs_received = u16::from(byte);
                self.store(byte, pool);
                self.state = RxState::FcsLo;
                RxEvent::Pending
            }
            RxState::FcsLo => {
                self.fcs_received |= u16::from(byte) << 8;
                self.store(byte, pool);

                if self.target.is_none() || self.fcs_received == self.fcs_computed {
                    self.state = RxState::FcsHi;
                    RxEvent::Pending
                } else {
                    warn!(
                        "fcs mismatch at mtu boundary: computed {:#06x}, received {:#06x}",
                        self.fcs_computed, self.fcs_received
                    );
                    self.state = RxState::WaitingForSync;
                    RxEvent::Discarded(Discard::FcsMismatch)
                }
            }
            RxState::FcsHi => {
                self.state = RxState::WaitingForSync;
                RxEvent::Discarded(Discard::Oversized)
            }
        }
    }

    fn expect_byte(&mut self, byte: u8, expected: u8, next: RxState) -> RxEvent {
        if byte == expected {
            self.state = next;
            RxEvent::Pending
        } else {
            debug!("out of sync: expected {expected:#04x}, got {byte:#04x}");
            self.state = RxState::WaitingForSync;
            RxEvent::Discarded(Discard::OutOfSync)
        }
    }

    fn store(&mut self, byte: u8, pool: &mut SegmentPool) {
        if let Some(slot) = self.target {
            pool.buffer_mut(slot)[self.write_index] = byte;
        }
        self.write_index += 1;
    }

    // FCS over the fixed header, the protocol and the first `len` stored bytes.
    fn payload_fcs(&self, len: usize, pool: &SegmentPool) -> u16 {
        let [hi, lo] = self.protocol.to_be_bytes();
        let mut digest = fcs::digest();
        digest.update(&[ADDRESS, CONTROL, hi, lo]);
        if let Some(slot) = self.target {
            digest.update(&pool.buffer(slot)[..len]);
        }
        digest.finalize()
    }

    // Closing flag after payload: the last two stored bytes are the FCS.
    fn close(&mut self, pool: &mut SegmentPool, queue: &mut PacketQueue) -> RxEvent {
        if self.write_index < FCS_LEN {
            return RxEvent::Discarded(Discard::TooShort);
        }
        let Some(slot) = self.target else {
            warn!("receive queue full, dropping frame for protocol {:#06x}", self.protocol);
            return RxEvent::Discarded(Discard::QueueFull);
        };

        let len = self.write_index - FCS_LEN;
        let computed = self.payload_fcs(len, pool);
        let buffer = pool.buffer(slot);
        let received = u16::from_le_bytes([buffer[len], buffer[len + 1]]);

        if computed != received {
            warn!(
                "fcs mismatch on protocol {:#06x}: computed {computed:#06x}, received {received:#06x}",
                self.protocol
            );
            return RxEvent::Discarded(Discard::FcsMismatch);
        }

        self.commit(len, pool, queue)
    }

    fn commit(&mut self, len: usize, pool: &mut SegmentPool, queue: &mut PacketQueue) -> RxEvent {
        let Some(slot) = self.target.take() else {
            warn!("receive queue full, dropping frame for protocol {:#06x}", self.protocol);
            return RxEvent::Discarded(Discard::QueueFull);
        };

        let protocol = Protocol::from(self.protocol);
        if pool.set_length(slot, len).is_err() || queue.try_enqueue(protocol).is_err() {
            return RxEvent::Discarded(Discard::QueueFull);
        }

        debug!("received {len} byte frame for protocol {:#06x}", self.protocol);
        RxEvent::Frame(protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    const MTU: usize = 8;

    struct Rig {
        pool: SegmentPool,
        queue: PacketQueue,
        deframer: Deframer,
    }

    impl Rig {
        fn new(slots: usize) -> Self {
            let mut pool = SegmentPool::with_capacity(slots);
            let queue = PacketQueue::new(&mut pool, slots, MTU + FCS_LEN).unwrap();
            Self {
                pool,
                queue,
                deframer: Deframer::new(MTU),
            }
        }

        fn feed(&mut self, bytes: &[u8]) -> Vec<RxEvent> {
            bytes
                .iter()
                .map(|&b| self.deframer.push_byte(b, &mut self.pool, &mut self.queue))
                .filter(|event| *event != RxEvent::Pending)
                .collect()
        }

        fn next_payload(&mut self) -> Option<(Protocol, Vec<u8>)> {
            let slot = self.queue.try_dequeue()?;
            Some((slot.protocol, self.pool.to_vec(slot.segment)))
        }
    }

    #[test]
    fn frame_with_no_garbage() {
        let mut rig = Rig::new(2);
        let frame = Frame::new(Protocol::Ip, vec![1, 2, 3]);

        assert_eq!(rig.feed(&frame.to_bytes()), vec![RxEvent::Frame(Protocol::Ip)]);
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, vec![1, 2, 3])));
        assert_eq!(rig.deframer.state(), RxState::Flag);
    }

    #[test]
    fn frame_with_previous_garbage() {
        let mut rig = Rig::new(2);
        let mut bytes = vec![0x12, 0x34, 0xFF, 0x03];
        bytes.extend(Frame::new(Protocol::Lcp, vec![9]).to_bytes());

        assert_eq!(rig.feed(&bytes), vec![RxEvent::Frame(Protocol::Lcp)]);
        assert_eq!(rig.next_payload(), Some((Protocol::Lcp, vec![9])));
    }

    #[test]
    fn consecutive_flags_are_absorbed() {
        let mut rig = Rig::new(2);
        let mut bytes = vec![FLAG, FLAG, FLAG];
        bytes.extend(Frame::new(Protocol::Ip, vec![5]).to_bytes());

        assert_eq!(rig.feed(&bytes), vec![RxEvent::Frame(Protocol::Ip)]);
    }

    #[test]
    fn empty_payload() {
        let mut rig = Rig::new(2);
        let frame = Frame::new(Protocol::Ip, Vec::new());

        assert_eq!(rig.feed(&frame.to_bytes()), vec![RxEvent::Frame(Protocol::Ip)]);
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, Vec::new())));
    }

    #[test]
    fn escaped_payload_bytes_are_restored() {
        let mut rig = Rig::new(2);
        let payload = vec![FLAG, ESCAPE, 0x20, FLAG];
        rig.feed(&Frame::new(Protocol::Ip, payload.clone()).to_bytes());

        assert_eq!(rig.next_payload(), Some((Protocol::Ip, payload)));
    }

    #[test]
    fn wrong_address_resyncs() {
        let mut rig = Rig::new(2);
        let events = rig.feed(&[FLAG, 0x01]);

        assert_eq!(events, vec![RxEvent::Discarded(Discard::OutOfSync)]);
        assert_eq!(rig.deframer.state(), RxState::WaitingForSync);
    }

    #[test]
    fn wrong_control_resyncs_and_next_frame_arrives() {
        let mut rig = Rig::new(2);
        let mut bytes = vec![FLAG, ADDRESS, 0x13, 0x00, 0x21, 0xAA];
        bytes.extend(Frame::new(Protocol::Ip, vec![1]).to_bytes());

        assert_eq!(
            rig.feed(&bytes),
            vec![
                RxEvent::Discarded(Discard::OutOfSync),
                RxEvent::Frame(Protocol::Ip)
            ]
        );
    }

    #[test]
    fn fcs_mismatch_drops_without_touching_queue() {
        let mut rig = Rig::new(2);
        let mut bytes = Frame::new(Protocol::Ip, vec![1, 2, 3]).to_bytes();
        bytes[5] = 0x55;

        assert_eq!(rig.feed(&bytes), vec![RxEvent::Discarded(Discard::FcsMismatch)]);
        assert!(rig.queue.is_empty());
        assert_eq!(rig.deframer.state(), RxState::Flag);
    }

    #[test]
    fn flag_inside_header_is_too_short() {
        let mut rig = Rig::new(2);
        assert_eq!(
            rig.feed(&[FLAG, ADDRESS, CONTROL, 0x00, FLAG]),
            vec![RxEvent::Discarded(Discard::TooShort)]
        );
        assert_eq!(
            rig.feed(&[ADDRESS, CONTROL, 0x00, 0x21, 0x01, FLAG]),
            vec![RxEvent::Discarded(Discard::TooShort)]
        );
    }

    #[test]
    fn escaped_flag_is_data_not_sync() {
        let mut rig = Rig::new(2);
        rig.feed(&[FLAG, ADDRESS, CONTROL, 0x00, 0x21, ESCAPE, FLAG]);
        assert_eq!(rig.deframer.state(), RxState::Data);
    }

    #[test]
    fn mtu_sized_payload_takes_explicit_fcs_path() {
        let mut rig = Rig::new(2);
        let payload: Vec<u8> = (1..=MTU as u8).collect();
        let bytes = Frame::new(Protocol::Ip, payload.clone()).to_bytes();

        // Flag + 4 header bytes + MTU payload bytes, none escaped.
        let (body, rest) = bytes.split_at(1 + 4 + MTU);
        rig.feed(body);
        assert_eq!(rig.deframer.state(), RxState::Data);

        let events = rig.feed(&rest[..rest.len() - 1]);
        assert!(events.is_empty());
        assert_eq!(rig.deframer.state(), RxState::FcsHi);

        assert_eq!(rig.feed(&[FLAG]), vec![RxEvent::Frame(Protocol::Ip)]);
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, payload)));
    }

    #[test]
    fn payload_one_below_mtu_closes_from_fcs_lo() {
        let mut rig = Rig::new(2);
        let payload: Vec<u8> = (1..MTU as u8).collect();
        let bytes = Frame::new(Protocol::Ip, payload.clone()).to_bytes();

        let (head, flag) = bytes.split_at(bytes.len() - 1);
        rig.feed(head);
        assert_eq!(rig.deframer.state(), RxState::FcsLo);

        assert_eq!(rig.feed(flag), vec![RxEvent::Frame(Protocol::Ip)]);
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, payload)));
    }

    #[test]
    fn oversized_frame_is_never_committed() {
        let mut rig = Rig::new(2);
        let mut bytes = Frame::new(Protocol::Ip, vec![0x11; MTU + 3]).to_bytes();
        bytes.extend(Frame::new(Protocol::Lcp, vec![1]).to_bytes());

        let events = rig.feed(&bytes);

        assert_eq!(events.last(), Some(&RxEvent::Frame(Protocol::Lcp)));
        assert!(!events.contains(&RxEvent::Frame(Protocol::Ip)));
        assert_eq!(rig.next_payload(), Some((Protocol::Lcp, vec![1])));
        assert_eq!(rig.next_payload(), None);
    }

    #[test]
    fn full_queue_drops_newest_and_keeps_pending() {
        let mut rig = Rig::new(2);
        rig.feed(&Frame::new(Protocol::Ip, vec![1]).to_bytes());
        rig.feed(&Frame::new(Protocol::Ip, vec![2]).to_bytes());

        let events = rig.feed(&Frame::new(Protocol::Ip, vec![3]).to_bytes());

        assert_eq!(events, vec![RxEvent::Discarded(Discard::QueueFull)]);
        assert_eq!(rig.queue.len(), 2);
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, vec![1])));
        assert_eq!(rig.next_payload(), Some((Protocol::Ip, vec![2])));
    }

    #[test]
    fn stalled_peer_leaves_state_parked() {
        let mut rig = Rig::new(2);
        rig.feed(&[FLAG, ADDRESS, CONTROL, 0x00, 0x21, 0x01, 0x02]);
        assert_eq!(rig.deframer.state(), RxState::Data);
        assert!(rig.queue.is_empty());
    }
}
