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

//! Payload checksum and CRC-16 routines

const CRC_POLY: u16 = 0x1021;

/// Sum of all bytes, truncated to 8 bits
pub fn generate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0, MSB first, no final XOR.
///
/// Running it over a payload followed by its big-endian CRC yields zero.
pub fn generate_crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(generate_checksum(&[]), 0);
        assert_eq!(generate_checksum(&[1, 2, 3]), 6);
        assert_eq!(generate_checksum(&[0xFF, 0x02]), 0x01);

        let block = [0x1Au8; 128];
        assert_eq!(generate_checksum(&block), ((0x1A * 128) % 256) as u8);

        let block: Vec<u8> = (0..128).map(|i| i as u8).collect();
        let expected = block.iter().map(|&b| b as u32).sum::<u32>() as u8;
        assert_eq!(generate_checksum(&block), expected);
    }

    #[test]
    fn test_crc16_known_values() {
        // CRC-16/XMODEM check value
        assert_eq!(generate_crc16(b"123456789"), 0x31C3);
        assert_eq!(generate_crc16(&[]), 0x0000);
        assert_eq!(generate_crc16(b"A"), 0x58E5);
    }

    #[test]
    fn test_crc16_residue_is_zero() {
        let payloads: [&[u8]; 3] = [
            b"Test data",
            &[0u8; 128],
            &[0x1A; 1024],
        ];

        for payload in payloads {
            let crc = generate_crc16(payload);
            let mut framed = payload.to_vec();
            framed.extend_from_slice(&crc.to_be_bytes());
            assert_eq!(generate_crc16(&framed), 0);
        }
    }
}
