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

use std::marker::PhantomData;
use std::time::Duration;
use crate::channel::OutputChannel;
use crate::error::{ModemError, SerialError};
use crate::fsm::{state_name, Transition};
use crate::protocol::*;
use crate::serial::SerialPort;

/// Total time to wait for the receiver to request a transfer
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Time to wait for the reply to a packet or to EOT
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// States
// ============================================================================

pub struct Begin;
pub struct AwaitReceiver;
pub struct PreparePacket;
pub struct SendPacket;
pub struct SendEot;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct SenderFsm<'a, State> {
    state: PhantomData<State>,
    serial: &'a mut dyn SerialPort,
    source: &'a mut dyn OutputChannel,
    buffer: &'a mut [u8],
    variant: Variant,
    block: u8,
    packet_len: usize,
    last_sent_size: usize,
    negotiation_left: Duration,
    eof: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub type SenderStep<'a> = Result<Transition<dyn SenderState<'a> + 'a>, ModemError>;

pub trait SenderState<'a> {
    fn step(self: Box<Self>) -> SenderStep<'a>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<'a, S: 'a> SenderFsm<'a, S> {
    fn transition<T>(self) -> Box<SenderFsm<'a, T>> {
        Box::new(SenderFsm {
            state: PhantomData,
            serial: self.serial,
            source: self.source,
            buffer: self.buffer,
            variant: self.variant,
            block: self.block,
            packet_len: self.packet_len,
            last_sent_size: self.last_sent_size,
            negotiation_left: self.negotiation_left,
            eof: self.eof,
        })
    }

    fn goto<T: 'a>(self) -> SenderStep<'a>
    where
        SenderFsm<'a, T>: SenderState<'a>,
    {
        let next = self.transition::<T>();
        Ok(Transition::Next(next as Box<dyn SenderState<'a> + 'a>))
    }

    fn stay(self) -> SenderStep<'a>
    where
        SenderFsm<'a, S>: SenderState<'a>,
    {
        Ok(Transition::Next(Box::new(self) as Box<dyn SenderState<'a> + 'a>))
    }

    fn serial_error(&self, e: SerialError) -> ModemError {
        tracing::debug!(state = state_name::<S>(), error = %e, "serial error");
        e.into()
    }

    fn read_reply(&mut self, timeout: Duration) -> Result<(u8, Duration), ModemError> {
        let mut buf = [0u8; 1];
        match self.serial.read_timeout(&mut buf, timeout) {
            Ok(elapsed) => Ok((buf[0], elapsed)),
            Err(e) => Err(self.serial_error(e)),
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> SenderState<'a> for SenderFsm<'a, Begin> {
    fn step(self: Box<Self>) -> SenderStep<'a> {
        let mut fsm = *self;
        // Stale bytes would be mistaken for the receiver's request
        if let Err(e) = fsm.serial.flush() {
            return Err(fsm.serial_error(e));
        }
        tracing::debug!(variant = %fsm.variant, "waiting for receiver");
        fsm.goto::<AwaitReceiver>()
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, AwaitReceiver> {
    fn step(self: Box<Self>) -> SenderStep<'a> {
        let mut fsm = *self;
        if fsm.negotiation_left.is_zero() {
            tracing::warn!("receiver never requested a transfer");
            return Err(ModemError::Timeout);
        }

        let (code, elapsed) = fsm.read_reply(fsm.negotiation_left)?;
        fsm.negotiation_left = fsm.negotiation_left.saturating_sub(elapsed);

        if code == fsm.variant.start_request() {
            tracing::debug!("Received: 0x{:02X}, starting {}", code, fsm.variant);
            fsm.goto::<PreparePacket>()
        } else {
            tracing::debug!("Ignoring 0x{:02X} while waiting for receiver", code);
            fsm.stay()
        }
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, PreparePacket> {
    fn step(self: Box<Self>) -> SenderStep<'a> {
        let mut fsm = *self;
        let mut layout = fsm.variant.layout();

        let bytes_read = fsm
            .source
            .fill(&mut fsm.buffer[layout.data()], fsm.last_sent_size)
            .map_err(ModemError::Channel)?;
        if bytes_read > layout.payload_len {
            return Err(ModemError::Channel(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("source returned {} bytes for a {} byte request", bytes_read, layout.payload_len),
            )));
        }

        // Less than a full 1K block left: finish with 128-byte CRC packets
        if fsm.variant == Variant::OneK && bytes_read < layout.payload_len {
            tracing::debug!(bytes_read, "switching to 128-byte packets");
            fsm.variant = Variant::Crc;
            layout = fsm.variant.layout();
        }

        if bytes_read < layout.payload_len {
            fsm.eof = true;
        }

        fsm.packet_len = layout.frame(&mut fsm.buffer[..], fsm.block, bytes_read);
        tracing::trace!(block = fsm.block, bytes_read, eof = fsm.eof, "prepared packet");
        fsm.goto::<SendPacket>()
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, SendPacket> {
    fn step(self: Box<Self>) -> SenderStep<'a> {
        let mut fsm = *self;

        if let Err(e) = fsm.serial.write_all(&fsm.buffer[..fsm.packet_len]) {
            return Err(fsm.serial_error(e));
        }
        if let Err(e) = fsm.serial.flush() {
            return Err(fsm.serial_error(e));
        }
        tracing::debug!("Sent: block {} ({} bytes)", fsm.block, fsm.packet_len);

        // Only the receiver decides whether a packet is sent again
        let (code, _) = fsm.read_reply(REPLY_TIMEOUT)?;
        match code {
            ACK => {
                tracing::debug!("Received: ACK");
                fsm.block = fsm.block.wrapping_add(1);
                fsm.last_sent_size = fsm.variant.layout().payload_len;
                if fsm.eof {
                    fsm.goto::<SendEot>()
                } else {
                    fsm.goto::<PreparePacket>()
                }
            }
            NAK => {
                tracing::warn!(block = fsm.block, "receiver rejected block, resending");
                fsm.last_sent_size = 0;
                fsm.eof = false;
                fsm.goto::<PreparePacket>()
            }
            CAN => {
                tracing::warn!("Received: CAN");
                Err(ModemError::Cancelled)
            }
            other => {
                tracing::warn!("Unexpected reply 0x{:02X}, treating as cancel", other);
                Err(ModemError::Cancelled)
            }
        }
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, SendEot> {
    fn step(self: Box<Self>) -> SenderStep<'a> {
        let mut fsm = *self;
        if let Err(e) = fsm.serial.write_all(&[EOT]) {
            return Err(fsm.serial_error(e));
        }
        tracing::debug!("Sent: EOT");

        let (code, _) = fsm.read_reply(REPLY_TIMEOUT)?;
        match code {
            ACK => {
                tracing::debug!("Received: ACK, transfer complete");
                Ok(Transition::Complete)
            }
            CAN => {
                tracing::warn!("Received: CAN after EOT");
                Err(ModemError::Cancelled)
            }
            other => {
                tracing::debug!("Received: 0x{:02X}, resending EOT", other);
                fsm.stay()
            }
        }
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl<'a> SenderFsm<'a, Begin> {
    pub fn new(
        serial: &'a mut dyn SerialPort,
        source: &'a mut dyn OutputChannel,
        buffer: &'a mut [u8],
        variant: Variant,
    ) -> Box<dyn SenderState<'a> + 'a> {
        Box::new(SenderFsm {
            state: PhantomData::<Begin>,
            serial,
            source,
            buffer,
            variant,
            block: 1,
            packet_len: 0,
            last_sent_size: 0,
            negotiation_left: NEGOTIATION_TIMEOUT,
            eof: false,
        })
    }
}

/// Sends everything `source` supplies using `variant`, downgrading from 1K to
/// 128-byte packets once less than a full 1K block remains.
///
/// `buffer` holds one packet at a time and must fit the largest packet of
/// `variant`.
pub fn transmit<'a>(
    source: &'a mut dyn OutputChannel,
    buffer: &'a mut [u8],
    serial: &'a mut dyn SerialPort,
    variant: Variant,
) -> Result<(), ModemError> {
    let needed = variant.layout().packet_len();
    if buffer.len() < needed {
        return Err(ModemError::BufferTooSmall { needed, actual: buffer.len() });
    }

    let mut state = SenderFsm::new(serial, source, buffer, variant);
    loop {
        match state.step()? {
            Transition::Next(next) => state = next,
            Transition::Complete => return Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
