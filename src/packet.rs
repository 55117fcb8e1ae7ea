//! # Packet Framing
//!
//! Wire format of the command protocol spoken over the serial link.
//!
//! ```text
//!  offset  0      1      2        3       4 .. 4+N-1   4+N     5+N     6+N
//!        ┌──────┬──────┬────────┬────────┬───────────┬───────┬───────┬──────┐
//!        │ 0x73 │  N   │command │ status │  payload  │ CRC lo│ CRC hi│ 0xD9 │
//!        └──────┴──────┴────────┴────────┴───────────┴───────┴───────┴──────┘
//!         └────────────── CRC-16/XMODEM ─────────────┘
//! ```
//!
//! Bit 7 of the command byte marks a request; responses carry the same code
//! with the bit cleared. The CRC covers every byte before it, start marker
//! included.

use crc::{Crc, CRC_16_XMODEM};

use crate::config::MAX_PACKET_BYTES;
use crate::error::FrameError;

/// First byte of every frame.
pub const START_MARKER: u8 = 0x73;
/// Last byte of every frame.
pub const END_MARKER: u8 = 0xD9;
/// Command bit set on requests.
pub const REQUEST_BIT: u8 = 0x80;
/// Start marker, byte count, command and status.
pub const HEADER_LEN: usize = 4;
/// Header plus CRC and end marker.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 3;
/// Largest payload that fits in `MAX_PACKET_BYTES`.
pub const MAX_PAYLOAD: usize = MAX_PACKET_BYTES - FRAME_OVERHEAD;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM (poly 0x1021, init 0) of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Total frame length for a payload of `payload_len` bytes.
pub const fn frame_len(payload_len: usize) -> usize {
    payload_len + FRAME_OVERHEAD
}

/// A validated frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub command: u8,
    pub status: u8,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Validate a complete frame.
    ///
    /// `frame` must hold exactly one frame, start marker through end marker.
    pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(FrameError::LengthMismatch);
        }
        if frame[0] != START_MARKER {
            return Err(FrameError::MissingStartMarker);
        }

        let payload_len = frame[1] as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong);
        }
        if frame.len() != frame_len(payload_len) {
            return Err(FrameError::LengthMismatch);
        }

        let crc_at = HEADER_LEN + payload_len;
        if frame[crc_at + 2] != END_MARKER {
            return Err(FrameError::MissingEndMarker);
        }

        let received = u16::from_le_bytes([frame[crc_at], frame[crc_at + 1]]);
        let computed = crc16(&frame[..crc_at]);
        if received != computed {
            return Err(FrameError::CrcMismatch { received, computed });
        }

        Ok(Packet {
            command: frame[2],
            status: frame[3],
            payload: &frame[HEADER_LEN..crc_at],
        })
    }

    /// Whether the request bit is set.
    pub fn is_request(&self) -> bool {
        self.command & REQUEST_BIT != 0
    }

    /// Command code with the request bit stripped.
    pub fn code(&self) -> u8 {
        self.command & !REQUEST_BIT
    }
}

/// Build a frame into `buf` and return its length.
///
/// # Errors
/// - `FrameError::PayloadTooLong` if `payload` exceeds [`MAX_PAYLOAD`]
/// - `FrameError::BufferTooSmall` if `buf` cannot hold the frame
pub fn encode(buf: &mut [u8], command: u8, status: u8, payload: &[u8]) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLong);
    }
    let len = frame_len(payload.len());
    if buf.len() < len {
        return Err(FrameError::BufferTooSmall);
    }

    let crc_at = HEADER_LEN + payload.len();
    buf[0] = START_MARKER;
    buf[1] = payload.len() as u8;
    buf[2] = command;
    buf[3] = status;
    buf[HEADER_LEN..crc_at].copy_from_slice(payload);

    let [lo, hi] = crc16(&buf[..crc_at]).to_le_bytes();
    buf[crc_at] = lo;
    buf[crc_at + 1] = hi;
    buf[crc_at + 2] = END_MARKER;
    Ok(len)
}
