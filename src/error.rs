//! # Error Types
//!
//! Every resource-exhaustion and corruption condition in the kernel is
//! surfaced as a value so the caller can decide to drop, log or back off.
//! None of them is fatal.

use core::fmt;

/// Kernel-level errors: scheduler and timer pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The task table already holds `MAX_TASKS` entries.
    TaskTableFull,
    /// The run queue already holds `RUN_QUEUE_DEPTH` pending entries.
    RunQueueFull,
    /// Every software timer slot is active.
    TimerPoolFull,
    /// The task id was never handed out by `register`.
    UnknownTask,
    /// A timer was armed with a zero countdown or zero reload.
    ZeroTicks,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskTableFull => write!(f, "task table full"),
            Self::RunQueueFull => write!(f, "run queue full"),
            Self::TimerPoolFull => write!(f, "no free timer slot"),
            Self::UnknownTask => write!(f, "unknown task id"),
            Self::ZeroTicks => write!(f, "timer count must be non-zero"),
        }
    }
}

/// Serial transport errors returned to main-loop callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    /// The transmit ring cannot take the whole write. Nothing was queued.
    TxBufferFull {
        /// Bytes the caller tried to queue.
        requested: usize,
        /// Bytes of space left in the ring.
        free: usize,
    },
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TxBufferFull { requested, free } => {
                write!(f, "tx buffer full ({} requested, {} free)", requested, free)
            }
        }
    }
}

/// Per-byte line errors reported by the hardware link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Stop bit not found where expected.
    Framing,
    /// Parity bit mismatch.
    Parity,
    /// A byte arrived before the previous one was read.
    Overrun,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing => write!(f, "framing error"),
            Self::Parity => write!(f, "parity error"),
            Self::Overrun => write!(f, "overrun error"),
        }
    }
}

/// Reasons a frame is rejected by the packet layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Frame length differs from the fixed overhead plus the byte count.
    LengthMismatch,
    /// Byte 0 is not the start marker.
    MissingStartMarker,
    /// The byte count exceeds the largest payload a frame can carry.
    PayloadTooLong,
    /// The end marker is not at its computed offset.
    MissingEndMarker,
    /// Trailing CRC does not match the CRC computed over header and payload.
    CrcMismatch {
        /// CRC carried by the frame.
        received: u16,
        /// CRC computed locally.
        computed: u16,
    },
    /// The output buffer cannot hold the frame being built.
    BufferTooSmall,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch => write!(f, "frame length mismatch"),
            Self::MissingStartMarker => write!(f, "missing start marker"),
            Self::PayloadTooLong => write!(f, "payload too long"),
            Self::MissingEndMarker => write!(f, "missing end marker"),
            Self::CrcMismatch { received, computed } => {
                write!(f, "crc mismatch (received {:#06x}, computed {:#06x})", received, computed)
            }
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(KernelError::RunQueueFull.to_string(), "run queue full");
        assert_eq!(
            SerialError::TxBufferFull { requested: 9, free: 4 }.to_string(),
            "tx buffer full (9 requested, 4 free)"
        );
        assert_eq!(
            FrameError::CrcMismatch { received: 0x1234, computed: 0x00ab }.to_string(),
            "crc mismatch (received 0x1234, computed 0x00ab)"
        );
    }
}
