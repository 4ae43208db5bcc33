//! Link Control Protocol negotiation.
//!
//! Handles the LCP packets dispatched by the link and answers peer
//! Configure-Requests with the "most restrictive response wins" policy:
//! Reject anything refused, otherwise Nak unacceptable values, otherwise Ack
//! everything and apply it.

pub mod options;
pub mod packet;

use hdlc::{ChainError, FrameCodec, Protocol, SegmentId, SegmentPool, TransmitError, Transport};
use log::{debug, info, warn};
use options::{OptionType, OptionWriter, Options};
use packet::{Code, HEADER_LEN, Header};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LcpError {
    #[error(transparent)]
    Transmit(#[from] TransmitError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("lcp packet truncated to {length} bytes")]
    Truncated { length: usize },
    #[error("lcp length field {declared} does not fit the {available} bytes received")]
    BadLength { declared: usize, available: usize },
    #[error("malformed lcp option at offset {offset}")]
    MalformedOption { offset: usize },
    #[error("{length} bytes of lcp data exceed the {capacity} byte buffer")]
    TooLarge { length: usize, capacity: usize },
}

/// Negotiation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState(u8);

impl LinkState {
    /// The peer acknowledged our Configure-Request.
    pub const HOST_CONFIGURED: Self = Self(0x01);
    /// We acknowledged the peer's Configure-Request.
    pub const CLIENT_CONFIGURED: Self = Self(0x02);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_opened(self) -> bool {
        self.contains(Self::HOST_CONFIGURED) && self.contains(Self::CLIENT_CONFIGURED)
    }
}

/// Values applied from an acknowledged peer request.
#[derive(Debug, Default)]
struct Accepted {
    mru: Option<u16>,
    magic: Option<u32>,
    accm: Option<u32>,
}

/// The LCP endpoint of one link.
///
/// Owns three segments taken from the codec's pool: a scratch copy of the
/// received packet body, and the header and body of outgoing packets. The
/// outgoing pair is relinked for every packet sent.
#[derive(Debug)]
pub struct LinkControl {
    state: LinkState,
    peer_magic: u32,
    local_magic: u32,
    peer_accm: u32,
    next_identifier: u8,
    pending_request: Option<u8>,
    mru: u16,
    rx_options: SegmentId,
    tx_header: SegmentId,
    tx_body: SegmentId,
}

impl LinkControl {
    /// Segments this endpoint takes from the pool.
    pub const SEGMENTS: usize = 3;

    pub fn new(pool: &mut SegmentPool, buffer_size: usize, mru: u16) -> Result<Self, ChainError> {
        Ok(Self {
            state: LinkState::default(),
            peer_magic: 0,
            local_magic: 0,
            peer_accm: 0,
            next_identifier: 1,
            pending_request: None,
            mru,
            rx_options: pool.create_zeroed(buffer_size)?,
            tx_header: pool.create_zeroed(HEADER_LEN)?,
            tx_body: pool.create_zeroed(buffer_size)?,
        })
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_host_configured(&self) -> bool {
        self.state.contains(LinkState::HOST_CONFIGURED)
    }

    pub fn is_client_configured(&self) -> bool {
        self.state.contains(LinkState::CLIENT_CONFIGURED)
    }

    pub fn peer_magic(&self) -> u32 {
        self.peer_magic
    }

    pub fn local_magic(&self) -> u32 {
        self.local_magic
    }

    pub fn peer_accm(&self) -> u32 {
        self.peer_accm
    }

    /// Sends our Configure-Request: magic number, an empty ACCM and our MRU.
    pub fn start_configuration<T: Transport>(&mut self, codec: &mut FrameCodec<T>) -> Result<(), LcpError> {
        ensure_idle(codec)?;

        let identifier = self.next_identifier;
        self.next_identifier = self.next_identifier.wrapping_add(1);
        self.local_magic = !self.peer_magic;

        let mut writer = OptionWriter::new(codec.pool_mut().buffer_mut(self.tx_body));
        writer.push(OptionType::MagicNumber, &self.local_magic.to_be_bytes())?;
        writer.push(OptionType::Accm, &0u32.to_be_bytes())?;
        writer.push(OptionType::Mru, &self.mru.to_be_bytes())?;
        let body_len = writer.len();

        self.send(codec, Code::ConfigureRequest, identifier, body_len)?;
        self.pending_request = Some(identifier);
        debug!("configure-request {identifier} sent, magic {:#010x}", self.local_magic);
        Ok(())
    }

    /// Handles one received LCP packet held in `packet`.
    pub fn on_receive<T: Transport>(&mut self, codec: &mut FrameCodec<T>, packet: SegmentId) -> Result<(), LcpError> {
        let pool = codec.pool_mut();
        let available = pool.tot_length(packet);

        let mut raw_header = [0u8; HEADER_LEN];
        for (slot, byte) in raw_header.iter_mut().zip(pool.bytes(packet)) {
            *slot = byte;
        }
        let header = Header::parse(&raw_header[..available.min(HEADER_LEN)])?;

        let declared = usize::from(header.length);
        if declared < HEADER_LEN || declared > available {
            return Err(LcpError::BadLength { declared, available });
        }

        let body_len = declared - HEADER_LEN;
        let capacity = pool.capacity(self.rx_options);
        if body_len > capacity {
            return Err(LcpError::TooLarge {
                length: body_len,
                capacity,
            });
        }

        // Padding past the length field is ignored.
        pool.set_length(self.rx_options, capacity)?;
        let copied = pool.copy_partial(self.rx_options, 0, packet, HEADER_LEN, body_len);
        pool.set_length(self.rx_options, copied)?;

        let identifier = header.identifier;
        match Code::try_from(header.code) {
            Ok(Code::ConfigureRequest) => self.on_configure_request(codec, identifier),
            Ok(Code::ConfigureAck) => {
                self.on_configure_ack(identifier);
                Ok(())
            }
            Ok(code @ (Code::ConfigureNak | Code::ConfigureReject)) => {
                warn!(
                    "peer answered configure-request {identifier} with {code:?}: {}",
                    crate::hex(codec.pool().data(self.rx_options))
                );
                Ok(())
            }
            Ok(Code::TerminateRequest) => {
                info!("peer requested termination");
                self.state = LinkState::default();
                self.pending_request = None;
                self.send(codec, Code::TerminateAck, identifier, 0)
            }
            Ok(Code::EchoRequest) => self.on_echo_request(codec, identifier),
            Ok(code) => {
                debug!(
                    "lcp {code:?} {identifier}: {}",
                    crate::hex(codec.pool().data(self.rx_options))
                );
                Ok(())
            }
            Err(code) => {
                debug!("unknown lcp code {code} ignored");
                Ok(())
            }
        }
    }

    fn on_configure_ack(&mut self, identifier: u8) {
        if self.pending_request != Some(identifier) {
            debug!("configure-ack {identifier} does not match an outstanding request");
            return;
        }

        self.pending_request = None;
        self.state.insert(LinkState::HOST_CONFIGURED);
        info!("host configured");
    }

    fn on_configure_request<T: Transport>(
        &mut self,
        codec: &mut FrameCodec<T>,
        identifier: u8,
    ) -> Result<(), LcpError> {
        ensure_idle(codec)?;

        let (request, response) = codec.pool_mut().read_write(self.rx_options, self.tx_body)?;
        let mut writer = OptionWriter::new(response);
        let mut accepted = Accepted::default();

        for option in Options::new(request) {
            let option = option?;
            if option.is_refused() {
                writer.push_raw(option.raw())?;
            }
        }

        let code = if !writer.is_empty() {
            Code::ConfigureReject
        } else {
            for option in Options::new(request) {
                let option = option?;
                if option.kind == OptionType::Mru && option.value_u16().is_some_and(|mru| mru > self.mru) {
                    writer.push(OptionType::Mru, &self.mru.to_be_bytes())?;
                }
            }

            if !writer.is_empty() {
                Code::ConfigureNak
            } else {
                for option in Options::new(request) {
                    let option = option?;
                    match option.kind {
                        OptionType::Mru => accepted.mru = option.value_u16(),
                        OptionType::MagicNumber => accepted.magic = option.value_u32(),
                        OptionType::Accm => accepted.accm = option.value_u32(),
                        _ => {}
                    }
                }
                writer.push_raw(request)?;
                Code::ConfigureAck
            }
        };

        let body_len = writer.len();
        self.send(codec, code, identifier, body_len)?;
        debug!("answered configure-request {identifier} with {code:?}");

        if code == Code::ConfigureAck {
            if let Some(mru) = accepted.mru {
                codec.set_mtu(usize::from(mru));
            }
            if let Some(magic) = accepted.magic {
                self.peer_magic = magic;
            }
            if let Some(accm) = accepted.accm {
                self.peer_accm = accm;
            }
            self.state.insert(LinkState::CLIENT_CONFIGURED);
            info!("client configured");
        }
        Ok(())
    }

    // Echo-Reply carries our magic number followed by the peer's data.
    fn on_echo_request<T: Transport>(&mut self, codec: &mut FrameCodec<T>, identifier: u8) -> Result<(), LcpError> {
        ensure_idle(codec)?;

        let (request, response) = codec.pool_mut().read_write(self.rx_options, self.tx_body)?;
        let data = request.get(4..).unwrap_or_default();
        let mut writer = OptionWriter::new(response);
        writer.push_raw(&self.local_magic.to_be_bytes())?;
        writer.push_raw(data)?;
        let body_len = writer.len();

        self.send(codec, Code::EchoReply, identifier, body_len)
    }

    /// Frames `tx_header` + `body_len` bytes of `tx_body` and starts the
    /// transmission.
    fn send<T: Transport>(
        &mut self,
        codec: &mut FrameCodec<T>,
        code: Code,
        identifier: u8,
        body_len: usize,
    ) -> Result<(), LcpError> {
        ensure_idle(codec)?;

        let length = HEADER_LEN + body_len;
        let header = Header::new(code, identifier, length as u16);

        let pool = codec.pool_mut();
        pool.detach(self.tx_header);
        pool.detach(self.tx_body);
        pool.buffer_mut(self.tx_header).copy_from_slice(&header.to_bytes());
        pool.set_length(self.tx_body, body_len)?;
        if body_len > 0 {
            pool.insert_at_end(self.tx_header, self.tx_body);
        }

        codec.tx_data_buffer(Protocol::Lcp, self.tx_header)?;
        Ok(())
    }
}

fn ensure_idle<T: Transport>(codec: &FrameCodec<T>) -> Result<(), LcpError> {
    if codec.is_tx_busy() {
        warn!("transmitter busy, lcp response dropped");
        return Err(TransmitError::Busy.into());
    }
    Ok(())
}
