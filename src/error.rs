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

//! Transport and protocol error types

use std::io;
use thiserror::Error;

/// Failure reported by a serial port
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("timed out waiting for data")]
    Timeout,

    #[error("serial port failure: {0}")]
    Hardware(#[source] io::Error),
}

impl From<io::Error> for SerialError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SerialError::Timeout,
            _ => SerialError::Hardware(err),
        }
    }
}

impl From<serialport::Error> for SerialError {
    fn from(err: serialport::Error) -> Self {
        SerialError::Hardware(err.into())
    }
}

/// Terminal result of a failed transfer
#[derive(Debug, Error)]
pub enum ModemError {
    #[error("timed out waiting for the other side")]
    Timeout,

    #[error("hardware error: {0}")]
    Hardware(#[source] io::Error),

    #[error("packet mismatch: expected block {expected}, received block {received} (complement 0x{complement:02X})")]
    PacketMismatch { expected: u8, received: u8, complement: u8 },

    #[error("bad checksum or CRC")]
    ChecksumOrCrcFailure,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("data channel error: {0}")]
    Channel(#[source] io::Error),

    #[error("scratch buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("transfer mode not implemented")]
    NotImplemented,
}

impl From<SerialError> for ModemError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Timeout => ModemError::Timeout,
            SerialError::Hardware(e) => ModemError::Hardware(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let e = SerialError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(e, SerialError::Timeout));

        let e = SerialError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(e, SerialError::Hardware(_)));
    }

    #[test]
    fn test_serial_to_modem_mapping() {
        assert!(matches!(ModemError::from(SerialError::Timeout), ModemError::Timeout));

        let hw = SerialError::Hardware(io::Error::new(io::ErrorKind::Other, "uart"));
        match ModemError::from(hw) {
            ModemError::Hardware(e) => assert_eq!(e.to_string(), "uart"),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
