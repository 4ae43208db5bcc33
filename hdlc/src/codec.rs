use crate::chain::{ChainError, SegmentId, SegmentPool};
use crate::deframer::{Deframer, Discard, RxEvent, RxState};
use crate::frame::{FCS_LEN, Protocol};
use crate::framer::{Framer, TransmitError, TxState};
use crate::queue::{PacketQueue, RxSlot};
use crate::transport::Transport;
use log::{info, warn};

/// Sizing of a [`FrameCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Largest payload the receive slots can hold.
    pub mtu_max: usize,
    /// Number of receive slots.
    pub rx_slots: usize,
    /// Total number of segments in the pool, receive slots included.
    pub segment_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            mtu_max: 1500,
            rx_slots: 2,
            segment_capacity: 16,
        }
    }
}

/// Counters kept by the codec. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub fcs_errors: u64,
    pub out_of_sync: u64,
    pub too_short: u64,
    pub oversized: u64,
    pub queue_overflows: u64,
}

impl LinkStats {
    fn record(&mut self, event: RxEvent) {
        match event {
            RxEvent::Pending => {}
            RxEvent::Frame(_) => self.frames_received += 1,
            RxEvent::Discarded(Discard::FcsMismatch) => self.fcs_errors += 1,
            RxEvent::Discarded(Discard::OutOfSync) => self.out_of_sync += 1,
            RxEvent::Discarded(Discard::TooShort) => self.too_short += 1,
            RxEvent::Discarded(Discard::Oversized) => self.oversized += 1,
            RxEvent::Discarded(Discard::QueueFull) => self.queue_overflows += 1,
        }
    }
}

/// Byte-oriented HDLC-like framing over a [`Transport`].
///
/// Owns the segment pool, the receive queue and both state machines. The
/// receive side is driven by [`on_byte_received`](Self::on_byte_received), the
/// transmit side by [`on_byte_transmitted`](Self::on_byte_transmitted); both
/// run to completion without blocking.
#[derive(Debug)]
pub struct FrameCodec<T> {
    transport: T,
    pool: SegmentPool,
    deframer: Deframer,
    framer: Framer,
    queue: PacketQueue,
    mtu_max: usize,
    stats: LinkStats,
}

impl<T: Transport> FrameCodec<T> {
    pub fn new(config: CodecConfig, transport: T) -> Result<Self, ChainError> {
        let mut pool = SegmentPool::with_capacity(config.segment_capacity);
        let queue = PacketQueue::new(&mut pool, config.rx_slots, config.mtu_max + FCS_LEN)?;

        Ok(Self {
            transport,
            pool,
            deframer: Deframer::new(config.mtu_max),
            framer: Framer::new(),
            queue,
            mtu_max: config.mtu_max,
            stats: LinkStats::default(),
        })
    }

    /// Receive event: one raw byte from the wire.
    pub fn on_byte_received(&mut self, byte: u8) -> RxEvent {
        let event = self.deframer.push_byte(byte, &mut self.pool, &mut self.queue);
        self.stats.record(event);
        event
    }

    /// Transmit-complete event: the previous byte has left the wire.
    pub fn on_byte_transmitted(&mut self) {
        if self.framer.on_byte_transmitted(&self.pool, &mut self.transport) {
            self.stats.frames_sent += 1;
        }
    }

    /// Starts sending `chain` as one frame. Fails without side effects while a
    /// previous frame is in flight.
    pub fn tx_data_buffer(&mut self, protocol: Protocol, chain: SegmentId) -> Result<(), TransmitError> {
        self.framer
            .start(protocol, chain, &self.pool, &mut self.transport)
            .inspect_err(|e| warn!("cannot transmit on protocol {:#06x}: {e}", u16::from(protocol)))
    }

    pub fn is_tx_busy(&self) -> bool {
        self.framer.is_busy()
    }

    /// Runs the transmit side to completion, for transports that accept bytes
    /// synchronously.
    pub fn flush_tx(&mut self) {
        while self.framer.is_busy() {
            self.on_byte_transmitted();
        }
    }

    /// Oldest received frame, if any.
    pub fn next_packet(&mut self) -> Option<RxSlot> {
        self.queue.try_dequeue()
    }

    pub fn pending_packets(&self) -> usize {
        self.queue.len()
    }

    pub fn mtu(&self) -> usize {
        self.deframer.mtu()
    }

    pub fn mtu_max(&self) -> usize {
        self.mtu_max
    }

    /// Receive MTU negotiated with the peer, clamped to the slot size.
    ///
    /// The value is the MRU the peer asked for in its Configure-Request and is
    /// taken as is: there is no lower bound beyond the clamp, so a peer asking
    /// for a tiny MRU shrinks what this side accepts to match. Longer frames
    /// are then dropped at the MTU boundary.
    pub fn set_mtu(&mut self, mtu: usize) {
        let mtu = mtu.min(self.mtu_max);
        if mtu != self.deframer.mtu() {
            info!("receive mtu set to {mtu}");
        }
        self.deframer.set_mtu(mtu);
    }

    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut SegmentPool {
        &mut self.pool
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn rx_state(&self) -> RxState {
        self.deframer.state()
    }

    pub fn tx_state(&self) -> TxState {
        self.framer.state()
    }
}
