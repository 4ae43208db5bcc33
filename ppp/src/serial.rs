use crate::error::Result;
use hdlc::Transport;
use log::{error, warn};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Serial port carrying the link.
///
/// Writes go straight to the port; reads are done by a background thread that
/// pushes every received byte into a bounded channel.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `port_name` and starts the reader thread. The returned receiver
    /// yields the raw bytes for [`PppLink::run`](crate::PppLink::run).
    pub fn open(port_name: &str, baud_rate: u32, depth: usize) -> Result<(Self, Receiver<u8>)> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(1000))
            .open()?;
        let mut reader = port.try_clone()?;

        let (tx, rx) = mpsc::sync_channel(depth);
        thread::spawn(move || {
            let mut buffer = [0u8; 256];
            loop {
                match reader.read(&mut buffer) {
                    Ok(n) => {
                        for &byte in &buffer[..n] {
                            if tx.send(byte).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => {
                        error!("serial read failed: {e}");
                        return;
                    }
                }
            }
        });

        Ok((Self { port }, rx))
    }
}

impl Transport for SerialTransport {
    fn transmit_byte(&mut self, byte: u8) {
        if let Err(e) = self.port.write_all(&[byte]) {
            warn!("serial write failed: {e}");
        }
    }
}
