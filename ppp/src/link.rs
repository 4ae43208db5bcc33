use crate::config::LinkConfig;
use crate::error::Result;
use crate::lcp::LinkControl;
use hdlc::{FrameCodec, LinkStats, Protocol, RxEvent, RxSlot, SegmentId, SegmentPool, Transport};
use log::{debug, info, warn};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Receiver of IP packets.
///
/// The packet's bytes live in a receive slot of `pool` and are only valid for
/// the duration of the call.
pub trait NetworkLayer {
    fn on_ip_frame(&mut self, pool: &SegmentPool, packet: SegmentId);
}

impl<F> NetworkLayer for F
where
    F: FnMut(&SegmentPool, SegmentId),
{
    fn on_ip_frame(&mut self, pool: &SegmentPool, packet: SegmentId) {
        self(pool, packet)
    }
}

/// A PPP link: the frame codec, its LCP endpoint and the network layer above.
pub struct PppLink<T> {
    codec: FrameCodec<T>,
    lcp: LinkControl,
    ip: Option<Box<dyn NetworkLayer + Send>>,
}

impl<T: Transport> PppLink<T> {
    pub fn new(config: &LinkConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let mut codec = FrameCodec::new(config.codec_config(), transport)?;
        let lcp = LinkControl::new(codec.pool_mut(), config.lcp_buffer_size, config.mru())?;

        info!(
            "link ready: mtu {}, {} receive slots, {} spare segments",
            config.mtu_max, config.rx_slots, config.spare_segments
        );
        Ok(Self {
            codec,
            lcp,
            ip: None,
        })
    }

    pub fn set_ip_handler(&mut self, handler: Box<dyn NetworkLayer + Send>) {
        self.ip = Some(handler);
    }

    /// Receive event from the transport.
    pub fn on_byte_received(&mut self, byte: u8) -> RxEvent {
        self.codec.on_byte_received(byte)
    }

    /// Transmit-complete event from the transport.
    pub fn on_byte_transmitted(&mut self) {
        self.codec.on_byte_transmitted();
    }

    pub fn flush_tx(&mut self) {
        self.codec.flush_tx();
    }

    /// Sends our LCP Configure-Request.
    pub fn start_configuration(&mut self) -> Result<()> {
        self.lcp.start_configuration(&mut self.codec)?;
        Ok(())
    }

    /// Sends an IP packet held in `chain`, which must stay untouched until the
    /// transmitter is idle again.
    pub fn send_ip(&mut self, chain: SegmentId) -> Result<()> {
        self.codec.tx_data_buffer(Protocol::Ip, chain)?;
        Ok(())
    }

    /// Drains received frames and hands each to its protocol handler.
    ///
    /// Stops as soon as the transmitter is busy so that a handler needing to
    /// answer always finds it idle. Returns the number of frames dispatched.
    pub fn poll(&mut self) -> usize {
        let mut dispatched = 0;
        while !self.codec.is_tx_busy() {
            let Some(slot) = self.codec.next_packet() else {
                break;
            };
            self.dispatch(slot);
            dispatched += 1;
        }
        dispatched
    }

    /// Alternates flushing the transmitter and polling until no frame is left.
    pub fn process(&mut self) {
        loop {
            self.codec.flush_tx();
            if self.poll() == 0 {
                break;
            }
        }
    }

    /// Feeds every byte of `rx` to the link until the sending side hangs up.
    pub fn run(&mut self, rx: &Receiver<u8>) {
        self.process();
        for byte in rx.iter() {
            self.on_byte_received(byte);
            self.process();
        }
        debug!("byte channel closed");
    }

    /// Like [`run`](Self::run), but returns `true` as soon as `done` holds and
    /// `false` once `timeout` elapses or the channel closes first.
    pub fn run_until(
        &mut self,
        rx: &Receiver<u8>,
        timeout: Duration,
        mut done: impl FnMut(&Self) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        self.process();

        while !done(self) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(byte) => {
                    self.on_byte_received(byte);
                    self.process();
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return done(self),
            }
        }
        true
    }

    fn dispatch(&mut self, slot: RxSlot) {
        match slot.protocol {
            Protocol::Lcp => {
                if let Err(e) = self.lcp.on_receive(&mut self.codec, slot.segment) {
                    warn!("lcp packet dropped: {e}");
                }
            }
            Protocol::Ip => match self.ip.as_mut() {
                Some(handler) => handler.on_ip_frame(self.codec.pool(), slot.segment),
                None => debug!(
                    "no network layer attached, dropping {} byte ip packet",
                    self.codec.pool().tot_length(slot.segment)
                ),
            },
            Protocol::Unknown(id) => debug!(
                "unhandled protocol {id:#06x}: {}",
                crate::hex(&self.codec.pool().to_vec(slot.segment))
            ),
        }
    }

    /// Both sides have acknowledged each other's configuration.
    pub fn is_opened(&self) -> bool {
        self.lcp.state().is_opened()
    }

    pub fn lcp(&self) -> &LinkControl {
        &self.lcp
    }

    pub fn codec(&self) -> &FrameCodec<T> {
        &self.codec
    }

    pub fn pool_mut(&mut self) -> &mut SegmentPool {
        self.codec.pool_mut()
    }

    pub fn transport(&self) -> &T {
        self.codec.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.codec.transport_mut()
    }

    pub fn stats(&self) -> LinkStats {
        self.codec.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdlc::Frame;
    use std::sync::{Arc, Mutex};

    fn link() -> PppLink<Vec<u8>> {
        PppLink::new(&LinkConfig::default(), Vec::new()).unwrap()
    }

    fn feed(link: &mut PppLink<Vec<u8>>, frame: Frame) {
        for byte in frame.to_bytes() {
            link.on_byte_received(byte);
        }
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = LinkConfig {
            rx_slots: 0,
            ..LinkConfig::default()
        };
        assert!(PppLink::new(&config, Vec::new()).is_err());
    }

    #[test]
    fn ip_frames_reach_the_handler() {
        let mut link = link();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        link.set_ip_handler(Box::new(move |pool: &SegmentPool, packet: SegmentId| {
            sink.lock().unwrap().push(pool.to_vec(packet));
        }));

        feed(&mut link, Frame::new(Protocol::Ip, vec![0x45, 0x00]));

        assert_eq!(link.poll(), 1);
        assert_eq!(*received.lock().unwrap(), vec![vec![0x45, 0x00]]);
    }

    #[test]
    fn frames_without_handler_are_drained() {
        let mut link = link();
        feed(&mut link, Frame::new(Protocol::Ip, vec![1]));
        feed(&mut link, Frame::new(Protocol::Unknown(0x8021), vec![2]));

        assert_eq!(link.poll(), 2);
        assert_eq!(link.codec().pending_packets(), 0);
        assert!(link.transport().is_empty());
    }

    #[test]
    fn dispatch_waits_for_idle_transmitter() {
        let mut link = link();
        link.start_configuration().unwrap();
        feed(&mut link, Frame::new(Protocol::Ip, vec![1]));

        assert_eq!(link.poll(), 0);
        assert_eq!(link.codec().pending_packets(), 1);

        link.process();
        assert_eq!(link.codec().pending_packets(), 0);
    }

    #[test]
    fn lcp_request_is_answered_by_process() {
        let mut link = link();
        feed(
            &mut link,
            Frame::new(Protocol::Lcp, vec![0x01, 0x05, 0x00, 0x08, 0x01, 0x04, 0x05, 0xDC]),
        );

        link.process();

        let reply = Frame::try_from(link.transport().as_slice()).unwrap();
        assert_eq!(reply.payload, vec![0x02, 0x05, 0x00, 0x08, 0x01, 0x04, 0x05, 0xDC]);
        assert!(link.lcp().is_client_configured());
        assert!(!link.is_opened());
    }
}
