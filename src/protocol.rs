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

//! XMODEM protocol constants and packet layouts

/// Start of header - begins a packet with a 128-byte payload
pub const SOH: u8 = 0x01;

/// Start of text - begins a packet with a 1024-byte payload
pub const STX: u8 = 0x02;

/// End of transmission - sender has no more data
pub const EOT: u8 = 0x04;

/// Acknowledge - receiver accepted the packet (or the EOT)
pub const ACK: u8 = 0x06;

/// Negative acknowledge - resend the packet; also starts a checksum transfer
pub const NAK: u8 = 0x15;

/// Cancel - abort the transfer
pub const CAN: u8 = 0x18;

/// 'C' - receiver requests a CRC transfer
pub const CRC_REQUEST: u8 = b'C';

/// CP/M end-of-file marker used to pad the final payload
pub const CPMEOF: u8 = 0x1A;

/// Offset of the payload within a packet (start marker, block, complement)
pub const HEADER_LEN: usize = 3;

/// Largest packet any variant produces
pub const MAX_PACKET_LEN: usize = HEADER_LEN + 1024 + 2;

/// Transfer variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// 128-byte payload, 8-bit checksum
    Basic,
    /// 128-byte payload, CRC-16
    Crc,
    /// 1024-byte payload, CRC-16
    OneK,
}

/// How the payload is protected on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    Checksum,
    Crc16,
}

impl Trailer {
    pub const fn len(self) -> usize {
        match self {
            Trailer::Checksum => 1,
            Trailer::Crc16 => 2,
        }
    }
}

impl Variant {
    pub const fn layout(self) -> PacketLayout {
        match self {
            Variant::Basic => PacketLayout { start: SOH, payload_len: 128, trailer: Trailer::Checksum },
            Variant::Crc => PacketLayout { start: SOH, payload_len: 128, trailer: Trailer::Crc16 },
            Variant::OneK => PacketLayout { start: STX, payload_len: 1024, trailer: Trailer::Crc16 },
        }
    }

    /// Byte the receiver sends to open a session in this variant
    pub const fn start_request(self) -> u8 {
        match self {
            Variant::Basic => NAK,
            Variant::Crc | Variant::OneK => CRC_REQUEST,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Variant::Basic => "XMODEM",
            Variant::Crc => "XMODEM-CRC",
            Variant::OneK => "XMODEM-1K",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed field positions of a packet for one variant.
///
/// Every region is derived from the payload size and trailer width, so a
/// layout is a plain value and never points into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub start: u8,
    pub payload_len: usize,
    pub trailer: Trailer,
}

impl PacketLayout {
    pub const BLOCK_NO: usize = 1;
    pub const COMP_BLOCK_NO: usize = 2;

    pub const fn data(&self) -> std::ops::Range<usize> {
        HEADER_LEN..HEADER_LEN + self.payload_len
    }

    pub const fn trailer_range(&self) -> std::ops::Range<usize> {
        let start = HEADER_LEN + self.payload_len;
        start..start + self.trailer.len()
    }

    /// Total bytes on the wire
    pub const fn packet_len(&self) -> usize {
        HEADER_LEN + self.payload_len + self.trailer.len()
    }

    /// Bytes following the start marker
    pub const fn body_len(&self) -> usize {
        self.packet_len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_sizes() {
        assert_eq!(Variant::Basic.layout().packet_len(), 132);
        assert_eq!(Variant::Crc.layout().packet_len(), 133);
        assert_eq!(Variant::OneK.layout().packet_len(), 1029);
        assert_eq!(Variant::OneK.layout().packet_len(), MAX_PACKET_LEN);
    }

    #[test]
    fn test_layout_regions() {
        let layout = Variant::Crc.layout();
        assert_eq!(layout.data(), 3..131);
        assert_eq!(layout.trailer_range(), 131..133);
        assert_eq!(layout.body_len(), 132);

        let layout = Variant::Basic.layout();
        assert_eq!(layout.trailer_range(), 131..132);

        let layout = Variant::OneK.layout();
        assert_eq!(layout.start, STX);
        assert_eq!(layout.data(), 3..1027);
        assert_eq!(layout.trailer_range(), 1027..1029);
    }

    #[test]
    fn test_start_request() {
        assert_eq!(Variant::Basic.start_request(), NAK);
        assert_eq!(Variant::Crc.start_request(), b'C');
        assert_eq!(Variant::OneK.start_request(), b'C');
    }
}
