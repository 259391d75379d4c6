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

//! Data channels feeding the sender and draining the receiver

use std::io::{self, Read, Seek, SeekFrom, Write};
use crate::protocol::CPMEOF;

/// Supplies payload bytes to the sender.
///
/// `buf.len()` is the requested size. `last_consumed` is how many bytes of the
/// previous offer went out and were acknowledged: 0 on the first call and
/// whenever the previous packet must be resent. Anything offered but not
/// consumed has to be offered again.
pub trait OutputChannel {
    fn fill(&mut self, buf: &mut [u8], last_consumed: usize) -> io::Result<usize>;
}

impl<F> OutputChannel for F
where
    F: FnMut(&mut [u8], usize) -> io::Result<usize>,
{
    fn fill(&mut self, buf: &mut [u8], last_consumed: usize) -> io::Result<usize> {
        self(buf, last_consumed)
    }
}

/// Accepts validated payloads from the receiver.
///
/// Accepting fewer than `buf.len()` bytes is a sink failure. The call with
/// `end_of_transfer` set carries no data and is made once, after EOT.
pub trait InputChannel {
    fn accept(&mut self, buf: &[u8], end_of_transfer: bool) -> io::Result<usize>;
}

impl<F> InputChannel for F
where
    F: FnMut(&[u8], bool) -> io::Result<usize>,
{
    fn accept(&mut self, buf: &[u8], end_of_transfer: bool) -> io::Result<usize> {
        self(buf, end_of_transfer)
    }
}

// ============================================================================
// Seekable source
// ============================================================================

/// Output channel over any seekable reader
pub struct SeekSource<R> {
    reader: R,
    offset: u64,
}

impl<R: Read + Seek> SeekSource<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        let offset = reader.stream_position()?;
        Ok(SeekSource { reader, offset })
    }

    /// Bytes acknowledged so far
    pub fn position(&self) -> u64 {
        self.offset
    }
}

impl<R: Read + Seek> OutputChannel for SeekSource<R> {
    fn fill(&mut self, buf: &mut [u8], last_consumed: usize) -> io::Result<usize> {
        self.offset += last_consumed as u64;
        self.reader.seek(SeekFrom::Start(self.offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }
}

// ============================================================================
// Writer sink
// ============================================================================

/// Input channel over any writer.
///
/// With `trim_padding` the newest block is held back until the next one
/// arrives, so trailing CPMEOF bytes can be stripped from the last block.
pub struct WriteSink<W: Write> {
    writer: W,
    trim_padding: bool,
    held: Vec<u8>,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W, trim_padding: bool) -> Self {
        WriteSink { writer, trim_padding, held: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> InputChannel for WriteSink<W> {
    fn accept(&mut self, buf: &[u8], end_of_transfer: bool) -> io::Result<usize> {
        if end_of_transfer {
            let end = self.held.iter().rposition(|&b| b != CPMEOF).map_or(0, |i| i + 1);
            self.writer.write_all(&self.held[..end])?;
            self.held.clear();
            self.writer.write_all(buf)?;
            self.writer.flush()?;
        } else if self.trim_padding {
            self.writer.write_all(&self.held)?;
            self.held.clear();
            self.held.extend_from_slice(buf);
        } else {
            self.writer.write_all(buf)?;
        }

        Ok(buf.len())
    }
}
