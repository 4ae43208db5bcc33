use log::warn;
use std::sync::mpsc::SyncSender;

/// Physical layer below the codec.
///
/// The codec hands over one byte per call and expects
/// [`FrameCodec::on_byte_transmitted`](crate::FrameCodec::on_byte_transmitted)
/// once that byte has left the wire.
pub trait Transport {
    fn transmit_byte(&mut self, byte: u8);
}

/// Captures transmitted bytes, mostly useful in tests.
impl Transport for Vec<u8> {
    fn transmit_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Feeds a peer's bounded byte queue.
impl Transport for SyncSender<u8> {
    fn transmit_byte(&mut self, byte: u8) {
        if self.send(byte).is_err() {
            warn!("peer byte queue closed, dropping {byte:#04x}");
        }
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit_byte(&mut self, byte: u8) {
        (**self).transmit_byte(byte);
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit_byte(&mut self, byte: u8) {
        (**self).transmit_byte(byte);
    }
}
