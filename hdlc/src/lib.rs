//! Byte-oriented HDLC-like framing for PPP over asynchronous serial links.

pub mod chain;
pub mod codec;
pub mod deframer;
pub mod fcs;
pub mod frame;
pub mod framer;
pub mod queue;
pub mod transport;

pub use chain::{ChainError, SegmentId, SegmentPool};
pub use codec::{CodecConfig, FrameCodec, LinkStats};
pub use deframer::{Discard, RxEvent, RxState};
pub use frame::{DeframingError, Frame, Protocol};
pub use framer::{TransmitError, TxState};
pub use queue::RxSlot;
pub use transport::Transport;
