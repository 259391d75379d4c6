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
use crate::channel::InputChannel;
use crate::error::{ModemError, SerialError};
use crate::fsm::{state_name, Transition};
use crate::protocol::*;
use crate::serial::SerialPort;

/// Time to wait for each start byte before repeating the reply code
pub const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the rest of a packet once its start byte arrived
pub const BODY_TIMEOUT: Duration = Duration::from_secs(1);

/// Silence that ends a purge
pub const PURGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Start-byte attempts beyond this many cancel the transfer
pub const MAX_START_ATTEMPTS: u32 = 11;

/// Unanswered CRC requests beyond this many fall back to checksum mode
pub const CRC_FALLBACK_ATTEMPTS: u32 = 2;

// ============================================================================
// States
// ============================================================================

pub struct Announce;
pub struct AwaitStart;
pub struct ReadBody;
pub struct Validate;
pub struct Acknowledge;
pub struct Reject;
pub struct Finish;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<'a, State> {
    state: PhantomData<State>,
    serial: &'a mut dyn SerialPort,
    sink: &'a mut dyn InputChannel,
    buffer: &'a mut [u8],
    // Negotiated variant; OneK also accepts 128-byte packets
    mode: Variant,
    // Layout of the packet currently in the buffer
    active: Variant,
    reply_code: u8,
    expected_block: u8,
    attempts: u32,
    negotiating: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub type ReceiverStep<'a> = Result<Transition<dyn ReceiverState<'a> + 'a>, ModemError>;

pub trait ReceiverState<'a> {
    fn step(self: Box<Self>) -> ReceiverStep<'a>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<'a, S: 'a> ReceiverFsm<'a, S> {
    fn transition<T>(self) -> Box<ReceiverFsm<'a, T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            serial: self.serial,
            sink: self.sink,
            buffer: self.buffer,
            mode: self.mode,
            active: self.active,
            reply_code: self.reply_code,
            expected_block: self.expected_block,
            attempts: self.attempts,
            negotiating: self.negotiating,
        })
    }

    fn goto<T: 'a>(self) -> ReceiverStep<'a>
    where
        ReceiverFsm<'a, T>: ReceiverState<'a>,
    {
        let next = self.transition::<T>();
        Ok(Transition::Next(next as Box<dyn ReceiverState<'a> + 'a>))
    }

    fn stay(self) -> ReceiverStep<'a>
    where
        ReceiverFsm<'a, S>: ReceiverState<'a>,
    {
        Ok(Transition::Next(Box::new(self) as Box<dyn ReceiverState<'a> + 'a>))
    }

    fn serial_error(&self, e: SerialError) -> ModemError {
        tracing::debug!(state = state_name::<S>(), error = %e, "serial error");
        e.into()
    }

    fn send_code(&mut self, code: u8) -> Result<(), ModemError> {
        match self.serial.write_all(&[code]) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.serial_error(e)),
        }
    }

    /// Tells the sender to stop and hands back `err` as the transfer result
    fn cancel(&mut self, err: ModemError) -> ModemError {
        tracing::warn!(state = state_name::<S>(), error = %err, "Sent: CAN");
        if let Err(e) = self.serial.write_all(&[CAN]) {
            tracing::debug!(error = %e, "failed to send CAN");
        }
        err
    }

    /// Drains the line until it stays quiet for `PURGE_TIMEOUT`
    fn purge(&mut self) -> Result<(), ModemError> {
        let mut buf = [0u8; 1];
        loop {
            match self.serial.read_timeout(&mut buf, PURGE_TIMEOUT) {
                Ok(_) => {}
                Err(SerialError::Timeout) => return Ok(()),
                Err(e) => return Err(self.serial_error(e)),
            }
        }
    }

    fn accepts(&self, start: u8) -> bool {
        match self.mode {
            Variant::OneK => start == STX || start == SOH,
            Variant::Crc | Variant::Basic => start == SOH,
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Announce> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        fsm.send_code(fsm.reply_code)?;
        tracing::debug!(variant = %fsm.mode, "Sent: 0x{:02X}", fsm.reply_code);
        fsm.goto::<AwaitStart>()
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, AwaitStart> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;

        let attempt = fsm.attempts;
        fsm.attempts += 1;
        if attempt > MAX_START_ATTEMPTS {
            return Err(fsm.cancel(ModemError::Timeout));
        }

        if fsm.negotiating && fsm.mode == Variant::Crc && attempt > CRC_FALLBACK_ATTEMPTS {
            tracing::warn!("no answer to CRC request, falling back to checksum");
            fsm.mode = Variant::Basic;
            fsm.active = Variant::Basic;
            fsm.reply_code = NAK;
        }

        let mut buf = [0u8; 1];
        match fsm.serial.read_timeout(&mut buf, START_TIMEOUT) {
            Ok(_) if buf[0] == EOT => {
                tracing::debug!("Received: EOT");
                fsm.goto::<Finish>()
            }
            Ok(_) if fsm.accepts(buf[0]) => {
                let start = buf[0];
                fsm.negotiating = false;
                fsm.buffer[0] = start;

                if fsm.mode == Variant::OneK {
                    let observed = if start == STX { Variant::OneK } else { Variant::Crc };
                    if observed != fsm.active {
                        tracing::debug!(from = %fsm.active, to = %observed, "sender changed packet size");
                        fsm.active = observed;
                    }
                }

                tracing::trace!("Received: start 0x{:02X}", start);
                fsm.goto::<ReadBody>()
            }
            Ok(_) => {
                tracing::debug!("Ignoring 0x{:02X} while waiting for a packet", buf[0]);
                fsm.stay()
            }
            Err(SerialError::Timeout) => {
                tracing::debug!(attempt, "timed out waiting for a packet, Sent: 0x{:02X}", fsm.reply_code);
                fsm.send_code(fsm.reply_code)?;
                fsm.stay()
            }
            Err(e) => Err(fsm.serial_error(e)),
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, ReadBody> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        let packet_len = fsm.active.layout().packet_len();

        match fsm.serial.read_timeout(&mut fsm.buffer[1..packet_len], BODY_TIMEOUT) {
            Ok(_) => fsm.goto::<Validate>(),
            Err(SerialError::Timeout) => {
                tracing::warn!("incomplete packet, purging line");
                // The sender flushes its input after each packet, so wait out
                // the rest of it before answering
                fsm.purge()?;
                fsm.goto::<Reject>()
            }
            Err(e) => {
                let err = fsm.serial_error(e);
                if let Err(e) = fsm.purge() {
                    tracing::debug!(error = %e, "purge failed");
                }
                Err(fsm.cancel(err))
            }
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Validate> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        let layout = fsm.active.layout();

        match layout.check(&fsm.buffer[..layout.packet_len()], fsm.expected_block) {
            Ok(()) => fsm.goto::<Acknowledge>(),
            Err(ModemError::ChecksumOrCrcFailure) => {
                tracing::warn!(block = fsm.expected_block, "bad checksum or CRC, rejecting block");
                fsm.goto::<Reject>()
            }
            // Out of sequence means the two sides lost sync; no retry can fix that
            Err(err) => Err(fsm.cancel(err)),
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Acknowledge> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        let layout = fsm.active.layout();
        let payload = layout.parse(&fsm.buffer[..layout.packet_len()]).payload;
        let len = payload.len();

        match fsm.sink.accept(payload, false) {
            Ok(n) if n >= len => {}
            Ok(n) => {
                let e = std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("sink accepted {} of {} bytes", n, len),
                );
                return Err(fsm.cancel(ModemError::Channel(e)));
            }
            Err(e) => return Err(fsm.cancel(ModemError::Channel(e))),
        }

        tracing::debug!("Received: block {} ({} bytes), Sent: ACK", fsm.expected_block, len);
        fsm.expected_block = fsm.expected_block.wrapping_add(1);
        fsm.attempts = 0;
        fsm.send_code(ACK)?;
        fsm.reply_code = NAK;
        fsm.goto::<AwaitStart>()
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Reject> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        fsm.send_code(NAK)?;
        tracing::debug!(block = fsm.expected_block, "Sent: NAK");
        fsm.reply_code = NAK;
        fsm.goto::<AwaitStart>()
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Finish> {
    fn step(self: Box<Self>) -> ReceiverStep<'a> {
        let mut fsm = *self;
        if let Err(e) = fsm.sink.accept(&[], true) {
            return Err(fsm.cancel(ModemError::Channel(e)));
        }

        // The data is all in; a lost final ACK only costs the sender a retry
        if let Err(e) = fsm.serial.write_all(&[ACK]) {
            tracing::warn!(error = %e, "failed to send final ACK");
        }
        tracing::debug!("Sent: ACK, transfer complete");
        Ok(Transition::Complete)
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl<'a> ReceiverFsm<'a, Announce> {
    pub fn new(
        serial: &'a mut dyn SerialPort,
        sink: &'a mut dyn InputChannel,
        buffer: &'a mut [u8],
        variant: Variant,
    ) -> Box<dyn ReceiverState<'a> + 'a> {
        Box::new(ReceiverFsm {
            state: PhantomData::<Announce>,
            serial,
            sink,
            buffer,
            mode: variant,
            active: variant,
            reply_code: variant.start_request(),
            expected_block: 1,
            attempts: 0,
            negotiating: true,
        })
    }
}

/// Receives a transfer in `variant`, handing every validated payload to `sink`.
///
/// `buffer` holds one packet at a time and must fit the largest packet of
/// `variant`.
pub fn receive<'a>(
    sink: &'a mut dyn InputChannel,
    buffer: &'a mut [u8],
    serial: &'a mut dyn SerialPort,
    variant: Variant,
) -> Result<(), ModemError> {
    let needed = variant.layout().packet_len();
    if buffer.len() < needed {
        return Err(ModemError::BufferTooSmall { needed, actual: buffer.len() });
    }

    let mut state = ReceiverFsm::new(serial, sink, buffer, variant);
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
