//! dirtyjtag-spi - DirtyJTAG USB probe SPI programmer support
//!
//! This crate drives SPI flash chips through a DirtyJTAG probe, a small
//! USB JTAG adapter whose firmware understands a fixed set of framed
//! commands over bulk transfers ("DJTAG1" protocol).
//!
//! # Protocol Overview
//!
//! The probe moves at most 30 payload bytes per transfer command and
//! answers each one with a fixed 32-byte reply frame. An SPI transaction of
//! arbitrary length is therefore split over the combined write+read byte
//! stream: each 30-byte chunk goes out as one frame, the captured replies
//! are reassembled into the logical read buffer, and every transaction is
//! bracketed by signal-line commands that return the target's state machine
//! to idle.
//!
//! Side-channel commands set the clock frequency (16-bit kHz value), drive
//! individual signal lines, and terminate a command burst. Only protocol
//! version 1 is supported; a probe reporting anything else is rejected at
//! open.
//!
//! # Example
//!
//! ```no_run
//! use dirtyjtag_spi::{parse_options, DirtyJtagSpi, SpiMaster};
//!
//! let config = parse_options(&[("frequency", "1MHz")])?;
//! let mut probe = DirtyJtagSpi::open_with_config(&config)?;
//!
//! // Read JEDEC ID
//! let id = probe.command(&[0x9F], 3)?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);
//! # Ok::<(), dirtyjtag_spi::DirtyJtagError>(())
//! ```

mod device;
mod error;
mod protocol;
mod spi;
mod transport;

pub use device::{parse_options, DirtyJtagConfig, DirtyJtagSpi};
pub use error::{DirtyJtagError, Result};
pub use protocol::{parse_frequency, ProtocolVersion, Signal};
pub use spi::{SpiFeatures, SpiMaster};
pub use transport::{Transport, UsbDeviceId, UsbTransport, DIRTYJTAG_DEVICES};
