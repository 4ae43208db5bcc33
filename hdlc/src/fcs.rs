//! 16-bit Frame Check Sequence (HDLC/CCITT, reversed polynomial 0x8408).
//!
//! The receive and transmit paths never hold a contiguous frame, so the
//! checksum is kept as a running [`Digest`] fed one byte at a time.

use crc::{CRC_16_IBM_SDLC, Crc, Digest};

/// X.25 parameters: init and xorout 0xFFFF, reflected.
pub static FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Register value left after running the FCS over a frame including its own,
/// transmitted FCS bytes, before the final complement.
pub const FCS_GOOD: u16 = 0xF0B8;

/// A fresh running FCS.
pub fn digest() -> Digest<'static, u16> {
    FCS.digest()
}

/// Seeds, folds and finalizes in one go.
pub fn checksum(bytes: &[u8]) -> u16 {
    FCS.checksum(bytes)
}

/// Checks data followed by its little-endian FCS.
pub fn is_good(bytes_with_fcs: &[u8]) -> bool {
    checksum(bytes_with_fcs) ^ 0xFFFF == FCS_GOOD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcs_on_known_data() {
        assert_eq!(checksum(b"123456789"), 0x906E);
    }

    #[test]
    fn fcs_over_ip_header_bytes() {
        assert_eq!(checksum(&[0xFF, 0x03, 0x00, 0x21]), 0xE6E3);
        assert_eq!(checksum(&[0xFF, 0x03, 0xC0, 0x21]), 0x2C49);
    }

    #[test]
    fn empty_input_is_seed_complement() {
        assert_eq!(checksum(&[]), 0x0000);
    }

    #[test]
    fn running_over_transmitted_fcs_leaves_good_residue() {
        let mut frame = vec![0xFF, 0x03, 0x00, 0x21, 0x01, 0x02, 0x03];
        let fcs = checksum(&frame);
        frame.extend_from_slice(&fcs.to_le_bytes());

        assert!(is_good(&frame));
        frame[4] ^= 0x01;
        assert!(!is_good(&frame));
    }

    #[test]
    fn byte_by_byte_equals_slice() {
        let data = b"point to point";
        let mut running = digest();
        for &b in data {
            running.update(&[b]);
        }
        assert_eq!(running.finalize(), checksum(data));
    }
}
