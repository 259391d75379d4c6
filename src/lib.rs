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

//! XMODEM, XMODEM-CRC and XMODEM-1K file transfer over a serial line.
//!
//! The sender and receiver are typestate machines driven one step at a time
//! by [`transmit`] and [`receive`]. Both borrow a scratch buffer for one
//! packet, a [`SerialPort`] and a data channel for the length of a single
//! transfer and keep nothing afterwards.

pub mod channel;
pub mod checksum;
pub mod error;
pub mod fsm;
pub mod packet;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod serial;

pub use channel::{InputChannel, OutputChannel, SeekSource, WriteSink};
pub use error::{ModemError, SerialError};
pub use protocol::{Variant, MAX_PACKET_LEN};
pub use receiver::receive;
pub use sender::transmit;
pub use serial::{RealSerialPort, SerialPort};
