//! SPI master trait boundary
//!
//! The generic flash dispatch layer (paged reads, paged writes, multi-command
//! sequencing) lives above this crate and drives a programmer purely through
//! the `SpiMaster` trait defined here.

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// SPI master feature flags
    ///
    /// These flags indicate what capabilities a programmer supports.
    /// Naming follows the convention from flashprog for compatibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiFeatures: u32 {
        /// Supports 4-byte addressing commands
        const FOUR_BYTE_ADDR = 1 << 0;
    }
}

impl Default for SpiFeatures {
    fn default() -> Self {
        SpiFeatures::empty()
    }
}

/// A programmer that can execute SPI transactions
///
/// The single primitive is `command`: clock out `write_data`, then clock in
/// `read_len` bytes within the same chip-select assertion. Higher layers
/// compose paged read/write/erase operations out of this primitive, chunking
/// at the granularity reported by `max_read_len`/`max_write_len`.
///
/// Transactions on one master are serialized by the `&mut self` receiver;
/// interleaving two transactions on the same device would corrupt both.
pub trait SpiMaster {
    /// Get the features supported by this programmer
    fn features(&self) -> SpiFeatures;

    /// Get the maximum number of bytes that can be read in a single transaction
    fn max_read_len(&self) -> usize;

    /// Get the maximum number of bytes that can be written in a single transaction
    fn max_write_len(&self) -> usize;

    /// Execute a single SPI transaction and return the bytes read
    fn command(&mut self, write_data: &[u8], read_len: usize) -> Result<Vec<u8>>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}
