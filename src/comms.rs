//! # Communications Protocol
//!
//! Two cooperative tasks sit between the serial transport and the command
//! handlers:
//!
//! ```text
//!  RX ring ──► populate task ──► RxSlot pool (round robin) ──► parse task ──► dispatch
//!   (Data)      one byte per run    Free → Filling → Ready      validate       │
//!                                                                              ▼
//!                                                tx staging buffer ──► enqueue_transmit
//! ```
//!
//! ## Populate Task
//!
//! Signalled with `Data` by the transport when the RX ring becomes
//! non-empty. Each run moves exactly one byte through the assembler and
//! re-signals itself while bytes remain, so a burst is drained one byte per
//! scheduler turn without starving other tasks.
//!
//! Assembler states:
//!
//! ```text
//!  AwaitingStart ──0x73──► AwaitingByteCount ──N──► AwaitingRemaining(N + 5)
//!     ▲   │ noise                  │ N > MAX_PAYLOAD         │ last byte
//!     │   ▼ (dropped)              ▼ (oversize, resync)      ▼
//!     └──────────────────────────────────────────── slot Ready, signal parse
//! ```
//!
//! ## Parse Task
//!
//! Takes Ready slots in the order they were filled, validates them with
//! [`Packet::parse`] and dispatches requests. Corrupt frames are dropped and
//! counted; there is no NACK.
//!
//! ## Backpressure
//!
//! When every slot is Ready the assembler stalls: bytes stay in the RX ring
//! and the parse task re-signals the assembler once it frees a slot.
//!
//! A signal the run queue rejects is never just dropped. A lost assembler
//! signal is handed back to the transport as an owed notification, which
//! the next received byte pays. A lost parse signal is remembered here.
//! The main loop's idle hook calls [`Comms::recover`] to settle both when
//! the line has gone quiet.

use crate::config::{MAX_PACKET_BYTES, MAX_RX_PACKETS};
use crate::error::{FrameError, KernelError};
use crate::link::SerialLink;
use crate::packet::{self, Packet, MAX_PAYLOAD, START_MARKER};
use crate::scheduler::{RunQueue, Scheduler, Signal};
use crate::serial::SerialTransport;
use crate::task::{TaskId, TriggerSource};

/// Status byte sent with every successful response.
pub const STATUS_OK: u8 = 0x01;

/// Bytes after the byte count: command, status, CRC (2) and end marker.
const FIXED_TAIL: usize = 5;

// ---------------------------------------------------------------------------
// Command table
// ---------------------------------------------------------------------------

/// Commands this node answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Reply with an empty `STATUS_OK` response.
    GetStatus = 0x10,
}

impl Command {
    /// Wire code, request bit clear.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    /// Look up a code with the request bit already stripped.
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x10 => Ok(Command::GetStatus),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Receive slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Filling,
    Ready,
}

struct RxSlot {
    state: SlotState,
    len: usize,
    data: [u8; MAX_PACKET_BYTES],
}

impl RxSlot {
    const EMPTY: RxSlot = RxSlot {
        state: SlotState::Free,
        len: 0,
        data: [0; MAX_PACKET_BYTES],
    };

    fn frame(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assembly {
    AwaitingStart,
    AwaitingByteCount,
    AwaitingRemaining { remaining: usize },
}

/// Protocol diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommsStats {
    /// Valid frames with the request bit set.
    pub requests: u32,
    /// Valid frames without the request bit.
    pub responses: u32,
    /// Frames dropped for a CRC mismatch.
    pub crc_failures: u32,
    /// Frames dropped for a bad end marker or length.
    pub framing_failures: u32,
    /// Valid requests with a code not in [`Command`].
    pub unknown_commands: u32,
    /// Bytes discarded while hunting for a start marker.
    pub noise_bytes: u32,
    /// Frames abandoned because the byte count exceeded the maximum payload.
    pub oversize: u32,
    /// Times the assembler found every slot Ready.
    pub stalls: u32,
    /// Responses the transport refused.
    pub tx_rejected: u32,
}

// ---------------------------------------------------------------------------
// Protocol state
// ---------------------------------------------------------------------------

/// Receive slot pool, assembler state and transmit staging buffer.
pub struct Comms {
    slots: [RxSlot; MAX_RX_PACKETS],
    populate_index: usize,
    parse_index: usize,
    assembly: Assembly,
    tx_staging: [u8; MAX_PACKET_BYTES],
    populate_task: TaskId,
    parse_task: TaskId,
    stalled: bool,
    parse_owed: bool,
    stats: CommsStats,
}

/// Application context that carries the protocol state.
///
/// The protocol tasks are generic over the context type and reach their
/// state through this trait.
pub trait CommsHost {
    type Link: SerialLink;

    /// Borrow the protocol state and the transport it talks through.
    fn comms_parts(&mut self) -> (&mut Comms, &SerialTransport<Self::Link>);
}

/// Scheduler entry for the assembler.
pub fn populate_task<C: CommsHost>(ctx: &mut C, queue: &RunQueue) {
    let (comms, serial) = ctx.comms_parts();
    comms.populate(serial, queue);
}

/// Scheduler entry for the frame parser.
pub fn parse_task<C: CommsHost>(ctx: &mut C, queue: &RunQueue) {
    let (comms, serial) = ctx.comms_parts();
    comms.parse(serial, queue);
}

impl Comms {
    pub const fn new() -> Self {
        Self {
            slots: [RxSlot::EMPTY; MAX_RX_PACKETS],
            populate_index: 0,
            parse_index: 0,
            assembly: Assembly::AwaitingStart,
            tx_staging: [0; MAX_PACKET_BYTES],
            populate_task: TaskId::NONE,
            parse_task: TaskId::NONE,
            stalled: false,
            parse_owed: false,
            stats: CommsStats {
                requests: 0,
                responses: 0,
                crc_failures: 0,
                framing_failures: 0,
                unknown_commands: 0,
                noise_bytes: 0,
                oversize: 0,
                stalls: 0,
                tx_rejected: 0,
            },
        }
    }

    /// Register both protocol tasks and point the transport's RX
    /// notification at the assembler.
    ///
    /// Clears every slot and the assembler state.
    pub fn install<C: CommsHost>(
        &mut self,
        scheduler: &mut Scheduler<'_, C>,
        serial: &SerialTransport<C::Link>,
    ) -> Result<(), KernelError> {
        *self = Self::new();
        self.populate_task = scheduler.register(populate_task::<C>)?;
        self.parse_task = scheduler.register(parse_task::<C>)?;
        serial.set_rx_notify_task(self.populate_task);

        crate::log_info!(
            "comms installed (populate task {}, parse task {})",
            self.populate_task.index(),
            self.parse_task.index()
        );
        Ok(())
    }

    /// Feed one received byte to the assembler.
    pub fn populate<L: SerialLink>(&mut self, serial: &SerialTransport<L>, signal: &impl Signal) {
        if self.slots[self.populate_index].state == SlotState::Ready {
            if !self.stalled {
                self.stalled = true;
                self.stats.stalls = self.stats.stalls.saturating_add(1);
                crate::log_warn!("all rx slots full, assembler stalled");
            }
            // A lost parse signal must not leave the pool wedged
            self.signal_parse(signal);
            return;
        }

        let Some(byte) = serial.dequeue_receive_byte() else {
            return;
        };
        self.accept(byte, signal);

        if serial.bytes_pending_receive() != 0 {
            if let Err(error) = signal.signal(self.populate_task, TriggerSource::Data) {
                crate::log_warn!("assembler re-signal failed: {}", error);
                serial.defer_rx_notify();
            }
        }
    }

    fn accept(&mut self, byte: u8, signal: &impl Signal) {
        let slot = &mut self.slots[self.populate_index];

        match self.assembly {
            Assembly::AwaitingStart => {
                if byte != START_MARKER {
                    self.stats.noise_bytes = self.stats.noise_bytes.saturating_add(1);
                    return;
                }
                slot.state = SlotState::Filling;
                slot.data[0] = byte;
                slot.len = 1;
                self.assembly = Assembly::AwaitingByteCount;
            }
            Assembly::AwaitingByteCount => {
                let payload_len = byte as usize;
                if payload_len > MAX_PAYLOAD {
                    self.stats.oversize = self.stats.oversize.saturating_add(1);
                    crate::log_warn!("byte count {} exceeds max payload, frame dropped", payload_len);
                    slot.state = SlotState::Free;
                    slot.len = 0;
                    self.assembly = Assembly::AwaitingStart;
                    return;
                }
                slot.data[1] = byte;
                slot.len = 2;
                self.assembly = Assembly::AwaitingRemaining {
                    remaining: payload_len + FIXED_TAIL,
                };
            }
            Assembly::AwaitingRemaining { remaining } => {
                slot.data[slot.len] = byte;
                slot.len += 1;

                if remaining > 1 {
                    self.assembly = Assembly::AwaitingRemaining {
                        remaining: remaining - 1,
                    };
                    return;
                }

                slot.state = SlotState::Ready;
                self.assembly = Assembly::AwaitingStart;
                self.populate_index = (self.populate_index + 1) % MAX_RX_PACKETS;
                self.signal_parse(signal);
            }
        }
    }

    fn signal_parse(&mut self, signal: &impl Signal) {
        match signal.signal(self.parse_task, TriggerSource::SelfTriggered) {
            Ok(()) => self.parse_owed = false,
            Err(error) => {
                self.parse_owed = true;
                crate::log_warn!("parse signal failed: {}", error);
            }
        }
    }

    /// Validate and dispatch the oldest Ready slot, if there is one.
    pub fn parse<L: SerialLink>(&mut self, serial: &SerialTransport<L>, signal: &impl Signal) {
        self.parse_owed = false;
        let index = self.parse_index;
        if self.slots[index].state != SlotState::Ready {
            return;
        }

        let Comms {
            slots,
            tx_staging,
            stats,
            ..
        } = self;

        match Packet::parse(slots[index].frame()) {
            Ok(packet) if packet.is_request() => {
                stats.requests = stats.requests.saturating_add(1);
                dispatch(&packet, tx_staging, stats, serial);
            }
            Ok(packet) => {
                stats.responses = stats.responses.saturating_add(1);
                crate::log_debug!("response {} ignored", packet.command);
            }
            Err(error) => {
                match error {
                    FrameError::CrcMismatch { .. } => {
                        stats.crc_failures = stats.crc_failures.saturating_add(1)
                    }
                    _ => stats.framing_failures = stats.framing_failures.saturating_add(1),
                }
                crate::log_warn!("frame dropped: {}", error);
            }
        }

        let slot = &mut slots[index];
        slot.state = SlotState::Free;
        slot.len = 0;
        self.parse_index = (index + 1) % MAX_RX_PACKETS;

        if self.stalled {
            self.stalled = false;
            if let Err(error) = signal.signal(self.populate_task, TriggerSource::Data) {
                crate::log_warn!("assembler resume failed: {}", error);
                serial.defer_rx_notify();
            }
        }
        if self.slots[self.parse_index].state == SlotState::Ready {
            self.signal_parse(signal);
        }
    }

    /// Re-issue any protocol signal the run queue rejected earlier.
    ///
    /// Meant for the main loop's idle path. Returns `true` if a task was
    /// queued, in which case the caller should not sleep.
    pub fn recover<L: SerialLink>(
        &mut self,
        serial: &SerialTransport<L>,
        signal: &impl Signal,
    ) -> bool {
        let mut queued = serial.retry_rx_notify(signal);
        if self.parse_owed {
            self.signal_parse(signal);
            queued |= !self.parse_owed;
        }
        queued
    }

    /// Whether a parse signal was rejected and not yet re-issued.
    pub fn parse_owed(&self) -> bool {
        self.parse_owed
    }

    /// Number of slots holding a complete, unparsed frame.
    pub fn ready_frames(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Ready)
            .count()
    }

    /// Whether the assembler is waiting for a free slot.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn populate_task_id(&self) -> TaskId {
        self.populate_task
    }

    pub fn parse_task_id(&self) -> TaskId {
        self.parse_task
    }

    /// Protocol diagnostics.
    pub fn stats(&self) -> CommsStats {
        self.stats
    }
}

impl Default for Comms {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch<L: SerialLink>(
    request: &Packet<'_>,
    tx_staging: &mut [u8; MAX_PACKET_BYTES],
    stats: &mut CommsStats,
    serial: &SerialTransport<L>,
) {
    let command = match Command::try_from(request.code()) {
        Ok(command) => command,
        Err(code) => {
            stats.unknown_commands = stats.unknown_commands.saturating_add(1);
            crate::log_debug!("unknown command {} dropped", code);
            return;
        }
    };

    let payload: &[u8] = match command {
        Command::GetStatus => &[],
    };

    let len = match packet::encode(tx_staging, command.code(), STATUS_OK, payload) {
        Ok(len) => len,
        Err(error) => {
            crate::log_error!("response encode failed: {}", error);
            return;
        }
    };

    if serial.enqueue_transmit(&tx_staging[..len]).is_err() {
        stats.tx_rejected = stats.tx_rejected.saturating_add(1);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
