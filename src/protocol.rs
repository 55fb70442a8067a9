//! DirtyJTAG protocol constants and wire frame encoding
//!
//! This module covers protocol version 1 ("DJTAG1") of the DirtyJTAG probe
//! firmware. The probe accepts bursts of fixed-format commands over USB bulk
//! transfers; a burst is executed in order and must end with `CMD_STOP`.
//!
//! A transfer command carries at most 30 payload bytes and is always padded
//! to a 32-byte frame. The probe replies to each transfer command with one
//! fixed 32-byte frame whose leading bytes are the data captured on TDO;
//! trailing bytes are undefined padding. The side-channel commands (set
//! signal lines, set clock frequency, stop) get no reply.
//!
//! Everything here is pure encoding and decoding with no I/O.

#![allow(dead_code)]

use bitflags::bitflags;

use crate::error::{DirtyJtagError, Result};

// USB device identifiers
pub const DIRTYJTAG_USB_VENDOR: u16 = 0x1209;
pub const DIRTYJTAG_USB_PRODUCT: u16 = 0xC0CA;

// USB endpoints
pub const BULK_OUT_EP: u8 = 0x01;
pub const BULK_IN_EP: u8 = 0x82;

/// Timeout for USB bulk transfers in milliseconds
pub const USB_TIMEOUT_MS: u64 = 100;

/// Maximum SPI payload bytes in one transfer command (DJTAG1 limit)
pub const XFER_MAX_PAYLOAD: usize = 30;

/// Fixed size of an outbound transfer command frame
pub const XFER_FRAME_SIZE: usize = 32;

/// Fixed size of the reply to a transfer command
pub const XFER_REPLY_SIZE: usize = 32;

/// Default SPI clock frequency in kHz when no option is given
pub const DEFAULT_FREQUENCY_KHZ: u16 = 100;

/// Command identifiers understood by the DJTAG1 firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop = 0x00,
    Info = 0x01,
    Freq = 0x02,
    Xfer = 0x03,
    SetSig = 0x04,
    GetSig = 0x05,
    Clk = 0x06,
}

bitflags! {
    /// Signal lines driven or sampled by the probe
    ///
    /// Bit positions match the DJTAG1 `SETSIG`/`GETSIG` mask encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Signal: u8 {
        /// Clock
        const TCK  = 1 << 1;
        /// Data out (host to target)
        const TDI  = 1 << 2;
        /// Data in (target to host)
        const TDO  = 1 << 3;
        /// Mode select
        const TMS  = 1 << 4;
        /// TAP reset (wired to HOLD# on SPI flashes)
        const TRST = 1 << 5;
        /// System reset (wired to WP# on SPI flashes)
        const SRST = 1 << 6;
    }
}

/// Probe protocol version
///
/// Only DJTAG1 is supported; anything else fails negotiation rather than
/// being silently treated as version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
}

impl ProtocolVersion {
    /// Negotiate the protocol version from the reply to an `Info` command
    ///
    /// The firmware answers `Info` with an ASCII identifier such as
    /// `"DJTAG1\n"` at the start of a reply frame.
    pub fn from_info_reply(reply: &[u8]) -> Result<Self> {
        let end = reply
            .iter()
            .position(|b| !b.is_ascii_graphic())
            .unwrap_or(reply.len());
        let ident = String::from_utf8_lossy(&reply[..end]);
        match ident.as_ref() {
            "DJTAG1" => Ok(ProtocolVersion::V1),
            _ => Err(DirtyJtagError::UnsupportedProtocol(ident.into_owned())),
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "DJTAG1"),
        }
    }
}

/// Transfer command: clock out up to 30 payload bytes
///
/// The frame layout is `[CMD_XFER, bit count, payload..., zero padding]`,
/// always `XFER_FRAME_SIZE` bytes on the wire. The bit count is the payload
/// length in bits, so always a multiple of 8 here.
#[derive(Clone)]
pub struct XferCommand {
    len: usize,
    data: [u8; XFER_MAX_PAYLOAD],
}

impl XferCommand {
    /// Build a transfer command from one chunk
    ///
    /// Callers must keep chunks within the DJTAG1 payload limit.
    pub fn new(chunk: &[u8]) -> Self {
        assert!(
            chunk.len() <= XFER_MAX_PAYLOAD,
            "chunk of {} bytes exceeds DJTAG1 payload limit",
            chunk.len()
        );
        let mut cmd = Self {
            len: chunk.len(),
            data: [0; XFER_MAX_PAYLOAD],
        };
        cmd.data[..chunk.len()].copy_from_slice(chunk);
        cmd
    }

    /// Serialize to the fixed 32-byte wire frame
    pub fn to_bytes(&self) -> [u8; XFER_FRAME_SIZE] {
        let mut buf = [0u8; XFER_FRAME_SIZE];
        buf[0] = Command::Xfer as u8;
        buf[1] = (self.len * 8) as u8;
        buf[2..2 + self.len].copy_from_slice(&self.data[..self.len]);
        buf
    }
}

/// Reply to a transfer command
///
/// The probe echoes the bytes captured on TDO in the leading positions of a
/// fixed 32-byte frame. It carries no status code; trailing bytes are
/// undefined padding and must not be interpreted.
#[derive(Clone)]
pub struct XferResponse {
    data: [u8; XFER_REPLY_SIZE],
}

impl XferResponse {
    /// Parse from a received reply frame
    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut rsp = Self {
            data: [0; XFER_REPLY_SIZE],
        };
        let len = std::cmp::min(buf.len(), XFER_REPLY_SIZE);
        rsp.data[..len].copy_from_slice(&buf[..len]);
        rsp
    }

    /// The captured bytes for a chunk of `len` payload bytes
    pub fn data(&self, len: usize) -> &[u8] {
        debug_assert!(len <= XFER_MAX_PAYLOAD);
        &self.data[..len]
    }
}

/// Set-signal command: drive the selected signal lines
///
/// `signals` selects which lines the command touches, `state` is the level
/// each selected line is driven to.
#[derive(Debug, Clone, Copy)]
pub struct SetSignalCommand {
    pub signals: Signal,
    pub state: Signal,
}

impl SetSignalCommand {
    /// Serialize to the 3-byte wire form
    pub fn to_bytes(&self) -> [u8; 3] {
        [Command::SetSig as u8, self.signals.bits(), self.state.bits()]
    }
}

/// Set-frequency command: clock rate in kHz, big-endian on the wire
#[derive(Debug, Clone, Copy)]
pub struct SetFrequencyCommand {
    pub khz: u16,
}

impl SetFrequencyCommand {
    /// Serialize to the 3-byte wire form
    pub fn to_bytes(&self) -> [u8; 3] {
        [Command::Freq as u8, (self.khz >> 8) as u8, self.khz as u8]
    }
}

/// Parse a frequency option string into kHz
///
/// Accepts an integer with an optional case-insensitive `Hz`, `kHz` or `MHz`
/// suffix; a bare integer is taken as kHz. The DJTAG1 frequency command
/// carries a 16-bit kHz value, so the result must land in [1, 65535] kHz.
pub fn parse_frequency(s: &str) -> Result<u16> {
    let s = s.trim();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(digits_end);
    if number.is_empty() {
        return Err(DirtyJtagError::InvalidFrequency(format!(
            "\"{}\" is not a number",
            s
        )));
    }
    let value: u64 = number.parse().map_err(|_| {
        DirtyJtagError::InvalidFrequency(format!("\"{}\" is not a number", s))
    })?;

    let khz = match suffix.to_ascii_lowercase().as_str() {
        "" | "khz" => value,
        "hz" => value / 1000,
        "mhz" => value.saturating_mul(1000),
        unit => {
            return Err(DirtyJtagError::InvalidFrequency(format!(
                "unknown unit \"{}\" in \"{}\"",
                unit, s
            )));
        }
    };

    if khz == 0 {
        return Err(DirtyJtagError::InvalidFrequency(format!(
            "\"{}\" is below the 1 kHz minimum",
            s
        )));
    }
    if khz > u16::MAX as u64 {
        return Err(DirtyJtagError::InvalidFrequency(format!(
            "\"{}\" is above the 65535 kHz maximum",
            s
        )));
    }

    Ok(khz as u16)
}
