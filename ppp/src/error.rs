use crate::lcp::LcpError;
use hdlc::{ChainError, TransmitError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Transmit(#[from] TransmitError),
    #[error(transparent)]
    Lcp(#[from] LcpError),
    #[error("link negotiation did not complete within {timeout:?}")]
    NotOpened { timeout: Duration },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
