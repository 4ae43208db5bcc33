//! PPP over asynchronous serial links: LCP negotiation on top of the `hdlc`
//! frame codec, with IP packets handed to a pluggable network layer.

pub mod config;
pub mod error;
pub mod lcp;
pub mod link;
pub mod loopback;
#[cfg(feature = "serial")]
pub mod serial;

pub use crate::config::LinkConfig;
pub use error::{Error, Result};
pub use hdlc::{LinkStats, Protocol, RxEvent, SegmentId, SegmentPool, Transport};
pub use link::{NetworkLayer, PppLink};

/// Space separated hex dump for log lines.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
