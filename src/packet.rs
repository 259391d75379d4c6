// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Packet framing and parsing

use crate::checksum::{generate_checksum, generate_crc16};
use crate::error::ModemError;
use crate::protocol::*;

/// A packet read back out of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub block: u8,
    pub complement: u8,
    pub payload: &'a [u8],
}

impl PacketLayout {
    /// Completes a packet whose first `filled` payload bytes are already in
    /// place: pads the rest with CPMEOF, writes the header and the trailer.
    ///
    /// Returns the packet length. `buf` must hold at least `packet_len()`.
    pub fn frame(&self, buf: &mut [u8], block: u8, filled: usize) -> usize {
        let data = self.data();
        buf[data.start + filled.min(self.payload_len)..data.end].fill(CPMEOF);

        buf[0] = self.start;
        buf[Self::BLOCK_NO] = block;
        buf[Self::COMP_BLOCK_NO] = !block;

        let trailer = self.trailer_range();
        match self.trailer {
            Trailer::Checksum => {
                let sum = generate_checksum(&buf[data]);
                buf[trailer.start] = sum;
            }
            Trailer::Crc16 => {
                let crc = generate_crc16(&buf[data]);
                buf[trailer].copy_from_slice(&crc.to_be_bytes());
            }
        }

        self.packet_len()
    }

    /// Splits a packet into its regions. `buf` must hold at least `packet_len()`.
    pub fn parse<'a>(&self, buf: &'a [u8]) -> Packet<'a> {
        Packet {
            block: buf[Self::BLOCK_NO],
            complement: buf[Self::COMP_BLOCK_NO],
            payload: &buf[self.data()],
        }
    }

    /// Checks a received packet against the block the receiver expects.
    ///
    /// A sequence error is `PacketMismatch`, a bad trailer on an in-sequence
    /// packet is `ChecksumOrCrcFailure`.
    pub fn check(&self, buf: &[u8], expected_block: u8) -> Result<(), ModemError> {
        let packet = self.parse(buf);
        if packet.block != expected_block || packet.complement != !expected_block {
            return Err(ModemError::PacketMismatch {
                expected: expected_block,
                received: packet.block,
                complement: packet.complement,
            });
        }
        if !self.verify(buf) {
            return Err(ModemError::ChecksumOrCrcFailure);
        }
        Ok(())
    }

    /// Whether the trailer matches the payload
    pub fn verify(&self, buf: &[u8]) -> bool {
        let data = self.data();
        match self.trailer {
            Trailer::Checksum => generate_checksum(&buf[data]) == buf[self.trailer_range().start],
            // CRC over payload and transmitted CRC leaves no remainder
            Trailer::Crc16 => generate_crc16(&buf[data.start..self.trailer_range().end]) == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(variant: Variant, block: u8, content: &[u8]) -> Vec<u8> {
        let layout = variant.layout();
        let mut buf = vec![0u8; MAX_PACKET_LEN];
        buf[HEADER_LEN..HEADER_LEN + content.len()].copy_from_slice(content);
        let len = layout.frame(&mut buf, block, content.len());
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_frame_basic_short_block() {
        let content = vec![0x55u8; 127];
        let packet = framed(Variant::Basic, 1, &content);

        assert_eq!(packet.len(), 132);
        assert_eq!(&packet[..3], &[SOH, 0x01, 0xFE]);
        assert_eq!(&packet[3..130], &content[..]);
        assert_eq!(packet[130], CPMEOF);

        let sum = generate_checksum(&packet[3..131]);
        assert_eq!(packet[131], sum);
    }

    #[test]
    fn test_frame_crc_trailer_big_endian() {
        let packet = framed(Variant::Crc, 7, b"hello");
        let crc = generate_crc16(&packet[3..131]);

        assert_eq!(packet.len(), 133);
        assert_eq!(packet[131], (crc >> 8) as u8);
        assert_eq!(packet[132], (crc & 0xFF) as u8);
        assert_eq!(generate_crc16(&packet[3..]), 0);
    }

    #[test]
    fn test_frame_onek() {
        let content: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        let packet = framed(Variant::OneK, 0xFF, &content);

        assert_eq!(packet.len(), 1029);
        assert_eq!(&packet[..3], &[STX, 0xFF, 0x00]);
        assert_eq!(&packet[3..1027], &content[..]);
    }

    #[test]
    fn test_parse_recovers_fields() {
        for variant in [Variant::Basic, Variant::Crc, Variant::OneK] {
            let layout = variant.layout();
            let packet = framed(variant, 0x42, b"payload");
            let parsed = layout.parse(&packet);

            assert_eq!(parsed.block, 0x42);
            assert_eq!(parsed.complement, 0xBD);
            assert_eq!(&parsed.payload[..7], b"payload");
            assert!(parsed.payload[7..].iter().all(|&b| b == CPMEOF));
            assert!(layout.verify(&packet), "{} packet should verify", variant);
        }
    }

    #[test]
    fn test_verify_detects_corruption() {
        for variant in [Variant::Basic, Variant::Crc, Variant::OneK] {
            let layout = variant.layout();
            let mut packet = framed(variant, 3, b"some data");
            packet[10] ^= 0x01;
            assert!(!layout.verify(&packet));
        }
    }

    #[test]
    fn test_fully_padded_block() {
        let packet = framed(Variant::Basic, 2, &[]);
        assert!(packet[3..131].iter().all(|&b| b == CPMEOF));
    }

    #[test]
    fn test_check_accepts_expected_block() {
        for variant in [Variant::Basic, Variant::Crc, Variant::OneK] {
            let packet = framed(variant, 9, b"in order");
            assert!(variant.layout().check(&packet, 9).is_ok());
        }
    }

    #[test]
    fn test_check_reports_bad_trailer() {
        for variant in [Variant::Basic, Variant::Crc, Variant::OneK] {
            let layout = variant.layout();
            let mut packet = framed(variant, 4, b"corrupted");
            packet[HEADER_LEN] ^= 0x80;

            let result = layout.check(&packet, 4);
            assert!(
                matches!(result, Err(ModemError::ChecksumOrCrcFailure)),
                "{} packet: {:?}",
                variant,
                result
            );
        }
    }

    #[test]
    fn test_check_sequence_before_trailer() {
        let layout = Variant::Crc.layout();
        let mut packet = framed(Variant::Crc, 5, b"late");
        packet[HEADER_LEN] ^= 0x80;

        match layout.check(&packet, 6) {
            Err(ModemError::PacketMismatch { expected, received, complement }) => {
                assert_eq!((expected, received, complement), (6, 5, 0xFA));
            }
            other => panic!("expected PacketMismatch, got {:?}", other),
        }

        // Right block number with a wrong complement is still out of sequence
        let mut packet = framed(Variant::Crc, 6, b"late");
        packet[PacketLayout::COMP_BLOCK_NO] = 0x00;
        assert!(matches!(layout.check(&packet, 6), Err(ModemError::PacketMismatch { .. })));
    }
}
