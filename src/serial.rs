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

use std::io::{Read, Write};
use std::time::{Duration, Instant};
use serialport::{SerialPort as SerialPortTrait, ClearBuffer, DataBits, Parity, StopBits};
use crate::error::SerialError;

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Blocking byte transport used by the XMODEM state machines
pub trait SerialPort {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), SerialError>;

    /// Fills `buf` completely, returning the time spent. `timeout` bounds the
    /// silence before the first byte and between any two bytes, so a long
    /// packet on a slow line is not cut off while it is still arriving.
    /// A partial read is reported as `SerialError::Timeout`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Duration, SerialError>;

    /// Discards any received but unread bytes
    fn flush(&mut self) -> Result<(), SerialError>;
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
}

impl RealSerialPort {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, SerialError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(RealSerialPort { port })
    }

    /// Drains pending output and releases the device
    pub fn close(mut self) -> Result<(), SerialError> {
        Write::flush(&mut self.port)?;
        Ok(())
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(buf).map_err(SerialError::Hardware)?;
        Write::flush(&mut self.port).map_err(SerialError::Hardware)?;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Duration, SerialError> {
        read_idle(&mut self.port, buf, timeout)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// A byte source whose blocking reads can be bounded
trait TimedRead: Read {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError>;
}

impl TimedRead for Box<dyn SerialPortTrait> {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.set_timeout(timeout)?;
        Ok(())
    }
}

/// Fills `buf`, waiting at most `timeout` for each new chunk of data
fn read_idle<R: TimedRead>(reader: &mut R, buf: &mut [u8], timeout: Duration) -> Result<Duration, SerialError> {
    let start = Instant::now();
    let mut last_data = start;
    let mut filled = 0;

    while filled < buf.len() {
        let remaining = timeout.saturating_sub(last_data.elapsed());
        if remaining.is_zero() {
            return Err(SerialError::Timeout);
        }

        reader.set_read_timeout(remaining)?;
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(SerialError::Timeout),
            Ok(n) => {
                filled += n;
                last_data = Instant::now();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(start.elapsed())
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Simulated time each delivered byte takes to arrive
    byte_time: Duration,
    // Timeout requested by every read, in call order
    pub timeouts: Vec<Duration>,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            byte_time: Duration::ZERO,
            timeouts: Vec::new(),
            write_log: Vec::new(),
            expected_writes,
        }
    }

    pub fn with_byte_time(mut self, byte_time: Duration) -> Self {
        self.byte_time = byte_time;
        self
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), SerialError> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Duration, SerialError> {
        self.timeouts.push(timeout);

        let mut bytes_read = 0;
        while bytes_read < buf.len() {
            // Out of responses = timeout
            if self.read_pos >= self.read_buffer.len() {
                return Err(SerialError::Timeout);
            }

            let response = self.read_buffer[self.read_pos];
            self.read_pos += 1;
            match response {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                }
                None => return Err(SerialError::Timeout),
            }
        }

        Ok(self.byte_time * bytes_read as u32)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

/// Wraps a mock and fails the `fail_on`-th read (1-based) with a hardware
/// error; every other call goes to the mock.
#[cfg(test)]
pub struct FaultyPort {
    pub inner: MockSerialPort,
    fail_on: usize,
    reads: usize,
}

#[cfg(test)]
impl FaultyPort {
    pub fn new(inner: MockSerialPort, fail_on: usize) -> Self {
        FaultyPort { inner, fail_on, reads: 0 }
    }
}

#[cfg(test)]
impl SerialPort for FaultyPort {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), SerialError> {
        self.inner.write_all(buf)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Duration, SerialError> {
        self.reads += 1;
        if self.reads == self.fail_on {
            return Err(SerialError::Hardware(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "line dropped",
            )));
        }
        self.inner.read_timeout(buf, timeout)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.inner.flush()
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_partial_read_is_timeout() {
        let mut port = MockSerialPort::new(vec![Some(1), Some(2), None, Some(3)], vec![]);
        let mut buf = [0u8; 4];
        assert!(matches!(
            port.read_timeout(&mut buf, Duration::from_secs(1)),
            Err(SerialError::Timeout)
        ));

        let mut buf = [0u8; 1];
        port.read_timeout(&mut buf, Duration::from_secs(1)).expect("byte available");
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_mock_reports_elapsed_time() {
        let mut port = MockSerialPort::new(vec![Some(b'x'), Some(b'y')], vec![b'!'])
            .with_byte_time(Duration::from_secs(3));
        port.write_all(b"!").unwrap();

        let mut buf = [0u8; 2];
        let elapsed = port.read_timeout(&mut buf, Duration::from_secs(10)).unwrap();
        assert_eq!(elapsed, Duration::from_secs(6));
        assert_eq!(&buf, b"xy");
        assert_eq!(port.timeouts, vec![Duration::from_secs(10)]);
    }

    /// Delivers one byte per read after `gap`, like a UART at a fixed baud
    struct PacedReader {
        data: Vec<u8>,
        pos: usize,
        gap: Duration,
        timeout: Duration,
    }

    impl Read for PacedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.data.len() || self.gap > self.timeout {
                std::thread::sleep(self.timeout);
                return Err(std::io::ErrorKind::TimedOut.into());
            }
            std::thread::sleep(self.gap);
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    impl TimedRead for PacedReader {
        fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
            self.timeout = timeout;
            Ok(())
        }
    }

    fn paced(len: usize, gap: Duration) -> PacedReader {
        PacedReader {
            data: (0..len).map(|i| i as u8).collect(),
            pos: 0,
            gap,
            timeout: Duration::ZERO,
        }
    }

    #[test]
    fn test_read_outlasts_timeout_while_data_flows() {
        let mut reader = paced(10, Duration::from_millis(20));
        let mut buf = [0u8; 10];

        let elapsed = read_idle(&mut reader, &mut buf, Duration::from_millis(100)).unwrap();
        assert!(elapsed >= Duration::from_millis(200), "took {:?}", elapsed);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_read_times_out_on_silence() {
        let mut reader = paced(4, Duration::from_millis(150));
        let mut buf = [0u8; 4];
        assert!(matches!(
            read_idle(&mut reader, &mut buf, Duration::from_millis(100)),
            Err(SerialError::Timeout)
        ));

        // Source runs dry before the buffer is full
        let mut reader = paced(2, Duration::ZERO);
        let mut buf = [0u8; 4];
        assert!(matches!(
            read_idle(&mut reader, &mut buf, Duration::from_millis(50)),
            Err(SerialError::Timeout)
        ));
    }

    #[test]
    fn test_onek_body_at_9600_baud() {
        // 1028 bytes after the start byte, about 1.04 ms each at 9600 8N1
        let mut reader = paced(1028, Duration::from_micros(1042));
        let mut buf = [0u8; 1028];

        let elapsed = read_idle(&mut reader, &mut buf, crate::receiver::BODY_TIMEOUT).unwrap();
        assert!(elapsed > crate::receiver::BODY_TIMEOUT, "took {:?}", elapsed);
        assert_eq!(buf[1027], (1027 % 256) as u8);
    }

    #[test]
    fn test_faulty_port_fails_chosen_read() {
        let mut port = FaultyPort::new(MockSerialPort::new(vec![Some(7)], vec![]), 2);
        let mut buf = [0u8; 1];
        port.read_timeout(&mut buf, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            port.read_timeout(&mut buf, Duration::from_secs(1)),
            Err(SerialError::Hardware(_))
        ));
    }
}
