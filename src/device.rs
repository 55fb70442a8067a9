//! DirtyJTAG device implementation
//!
//! This module provides the main `DirtyJtagSpi` struct that owns the probe
//! session and implements the `SpiMaster` trait.
//!
//! The probe firmware only moves 30 payload bytes per transfer command, so an
//! arbitrary-length SPI transaction is split over a combined write+read byte
//! stream: chunk boundaries are a function of the byte offset in that stream,
//! not of the write/read split, and a chunk may straddle the boundary. Bytes
//! in the read region go out as zero filler while the captured reply bytes
//! for the same positions are reassembled into the logical read buffer.

use std::time::Duration;

use crate::error::{DirtyJtagError, Result};
use crate::protocol::{
    Command, ProtocolVersion, SetFrequencyCommand, SetSignalCommand, Signal, XferCommand,
    XferResponse, DEFAULT_FREQUENCY_KHZ, XFER_MAX_PAYLOAD, XFER_REPLY_SIZE,
};
use crate::spi::{SpiFeatures, SpiMaster};
use crate::transport::{Transport, UsbTransport, DIRTYJTAG_DEVICES};

/// Configuration options for opening a DirtyJTAG probe
#[derive(Debug, Clone)]
pub struct DirtyJtagConfig {
    /// SPI clock frequency in kHz
    pub frequency_khz: u16,
}

impl Default for DirtyJtagConfig {
    fn default() -> Self {
        Self {
            frequency_khz: DEFAULT_FREQUENCY_KHZ,
        }
    }
}

/// Parse programmer options from key-value pairs
///
/// Supported options:
/// - `frequency=<n>[Hz|kHz|MHz]` - SPI clock frequency (default 100 kHz)
pub fn parse_options(options: &[(&str, &str)]) -> Result<DirtyJtagConfig> {
    let mut config = DirtyJtagConfig::default();

    for (key, value) in options {
        match *key {
            "frequency" => {
                config.frequency_khz = crate::protocol::parse_frequency(value)?;
            }
            _ => {
                return Err(DirtyJtagError::InvalidParameter(format!(
                    "Unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// DirtyJTAG SPI programmer
///
/// This struct represents one session with a DirtyJTAG probe: it exclusively
/// owns the transport for its lifetime and implements the `SpiMaster` trait
/// for communicating with SPI flash chips wired to the probe's JTAG header.
pub struct DirtyJtagSpi<T: Transport> {
    /// Transport to the probe
    transport: T,
    /// Negotiated protocol version
    protocol_version: ProtocolVersion,
}

impl DirtyJtagSpi<UsbTransport> {
    /// Open a DirtyJTAG probe with default configuration
    pub fn open() -> Result<Self> {
        Self::open_with_config(&DirtyJtagConfig::default())
    }

    /// Open a DirtyJTAG probe over USB with specific configuration
    pub fn open_with_config(config: &DirtyJtagConfig) -> Result<Self> {
        let transport = UsbTransport::open(DIRTYJTAG_DEVICES)?;
        Self::new(transport, config)
    }
}

impl<T: Transport> DirtyJtagSpi<T> {
    /// Create a session over an already-open transport
    ///
    /// Negotiates the protocol version, then primes the probe: all data and
    /// clock lines low with TMS and both resets released, clock rate set,
    /// stop. The transport is released on every failure path by drop.
    pub fn new(mut transport: T, config: &DirtyJtagConfig) -> Result<Self> {
        transport.send(&[Command::Info as u8, Command::Stop as u8])?;
        let reply = transport.receive(XFER_REPLY_SIZE)?;
        let protocol_version = ProtocolVersion::from_info_reply(&reply)?;
        log::info!("dirtyjtag: probe speaks {}", protocol_version);

        let mut init = Vec::new();
        init.extend_from_slice(
            &SetSignalCommand {
                signals: Signal::TCK
                    | Signal::TDI
                    | Signal::TMS
                    | Signal::TRST
                    | Signal::SRST,
                state: Signal::TMS | Signal::TRST | Signal::SRST,
            }
            .to_bytes(),
        );
        init.extend_from_slice(
            &SetFrequencyCommand {
                khz: config.frequency_khz,
            }
            .to_bytes(),
        );
        init.push(Command::Stop as u8);
        transport.send(&init)?;

        log::debug!(
            "dirtyjtag: initialized at {} kHz",
            config.frequency_khz
        );

        Ok(Self {
            transport,
            protocol_version,
        })
    }

    /// The protocol version the probe negotiated at open
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Execute one SPI transaction: clock out `write_data`, then clock in
    /// `read_len` bytes within the same chip-select assertion
    ///
    /// Splits the combined write+read stream into 30-byte chunks, sends one
    /// transfer frame per chunk, and reassembles the captured replies. The
    /// terminating TMS/stop burst is sent whether or not the chunk loop
    /// succeeded, so the target's state machine always returns to idle.
    pub fn spi_transfer(&mut self, write_data: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let total = write_data.len() + read_len;
        if total == 0 {
            return Ok(Vec::new());
        }

        let num_chunks = total.div_ceil(XFER_MAX_PAYLOAD);

        // Combined logical stream: write payload first, zeroed placeholders
        // for the read region and the tail padding
        let mut stream = vec![0u8; num_chunks * XFER_MAX_PAYLOAD];
        stream[..write_data.len()].copy_from_slice(write_data);
        let mut received = vec![0u8; num_chunks * XFER_MAX_PAYLOAD];

        let xfer_result = self.run_chunks(&stream, &mut received, total, num_chunks);
        let reset_result = self.reset_signals();
        xfer_result?;
        reset_result?;

        Ok(received[write_data.len()..total].to_vec())
    }

    /// Send the transfer frames and scatter the replies into `received`
    fn run_chunks(
        &mut self,
        stream: &[u8],
        received: &mut [u8],
        total: usize,
        num_chunks: usize,
    ) -> Result<()> {
        for i in 0..num_chunks {
            let offset = i * XFER_MAX_PAYLOAD;
            let chunk_len = if i == num_chunks - 1 && total % XFER_MAX_PAYLOAD != 0 {
                total % XFER_MAX_PAYLOAD
            } else {
                XFER_MAX_PAYLOAD
            };

            let cmd = XferCommand::new(&stream[offset..offset + chunk_len]);
            self.transport.send(&cmd.to_bytes())?;

            let reply = self.transport.receive(XFER_REPLY_SIZE)?;
            if reply.len() != XFER_REPLY_SIZE {
                return Err(DirtyJtagError::ShortTransfer {
                    op: "receive",
                    expected: XFER_REPLY_SIZE,
                    actual: reply.len(),
                });
            }

            let rsp = XferResponse::from_bytes(&reply);
            received[offset..offset + chunk_len].copy_from_slice(rsp.data(chunk_len));

            log::trace!(
                "dirtyjtag: chunk {}/{} transferred {} bytes",
                i + 1,
                num_chunks,
                chunk_len
            );
        }
        Ok(())
    }

    /// Assert TMS and stop, returning the target's state machine to idle
    ///
    /// The probe sends no reply to this burst.
    fn reset_signals(&mut self) -> Result<()> {
        let mut burst = Vec::with_capacity(4);
        burst.extend_from_slice(
            &SetSignalCommand {
                signals: Signal::TMS,
                state: Signal::TMS,
            }
            .to_bytes(),
        );
        burst.push(Command::Stop as u8);
        self.transport.send(&burst)
    }
}

impl<T: Transport> Drop for DirtyJtagSpi<T> {
    fn drop(&mut self) {
        // Terminate any half-parsed command burst in the probe
        if self.transport.send(&[Command::Stop as u8]).is_err() {
            log::warn!("dirtyjtag: failed to quiesce probe on shutdown");
        }
    }
}

impl<T: Transport> SpiMaster for DirtyJtagSpi<T> {
    fn features(&self) -> SpiFeatures {
        SpiFeatures::FOUR_BYTE_ADDR
    }

    fn max_read_len(&self) -> usize {
        XFER_MAX_PAYLOAD
    }

    fn max_write_len(&self) -> usize {
        XFER_MAX_PAYLOAD
    }

    fn command(&mut self, write_data: &[u8], read_len: usize) -> Result<Vec<u8>> {
        log::debug!(
            "dirtyjtag: SPI command write_len={} read_len={}",
            write_data.len(),
            read_len
        );
        self.spi_transfer(write_data, read_len)
    }

    fn delay_us(&mut self, us: u32) {
        if us > 0 {
            std::thread::sleep(Duration::from_micros(us as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct MockState {
        /// Every buffer handed to `send`, in order
        sent: Vec<Vec<u8>>,
        /// Queued bulk-in packets
        pending: VecDeque<Vec<u8>>,
        /// Reply served for the Info command
        info_reply: Vec<u8>,
        /// Truncate the reply to the n-th transfer command (0-based)
        short_reply_on_xfer: Option<usize>,
        xfer_count: usize,
    }

    /// Transport double that answers each transfer frame with a reply whose
    /// byte at payload position `j` is the chunk's stream offset plus `j`,
    /// so reassembly errors show up as wrong byte values.
    #[derive(Clone)]
    struct MockTransport(Rc<RefCell<MockState>>);

    impl MockTransport {
        fn new() -> (Self, Rc<RefCell<MockState>>) {
            let state = Rc::new(RefCell::new(MockState {
                sent: Vec::new(),
                pending: VecDeque::new(),
                info_reply: b"DJTAG1\n".to_vec(),
                short_reply_on_xfer: None,
                xfer_count: 0,
            }));
            (Self(state.clone()), state)
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, data: &[u8]) -> Result<()> {
            let mut state = self.0.borrow_mut();
            state.sent.push(data.to_vec());

            match data[0] {
                x if x == Command::Xfer as u8 => {
                    let index = state.xfer_count;
                    state.xfer_count += 1;
                    let mut reply = vec![0u8; XFER_REPLY_SIZE];
                    for (j, b) in reply.iter_mut().enumerate() {
                        *b = (index * XFER_MAX_PAYLOAD + j) as u8;
                    }
                    if state.short_reply_on_xfer == Some(index) {
                        reply.truncate(16);
                    }
                    state.pending.push_back(reply);
                }
                x if x == Command::Info as u8 => {
                    let mut reply = state.info_reply.clone();
                    reply.resize(XFER_REPLY_SIZE, 0);
                    state.pending.push_back(reply);
                }
                _ => {}
            }
            Ok(())
        }

        fn receive(&mut self, _len: usize) -> Result<Vec<u8>> {
            self.0
                .borrow_mut()
                .pending
                .pop_front()
                .ok_or_else(|| DirtyJtagError::TransferFailed("no pending reply".into()))
        }
    }

    fn open_session() -> (DirtyJtagSpi<MockTransport>, Rc<RefCell<MockState>>) {
        let (transport, state) = MockTransport::new();
        let dev = DirtyJtagSpi::new(transport, &DirtyJtagConfig::default()).unwrap();
        state.borrow_mut().sent.clear();
        (dev, state)
    }

    fn xfer_frames(sent: &[Vec<u8>]) -> Vec<Vec<u8>> {
        sent.iter()
            .filter(|f| f[0] == Command::Xfer as u8)
            .cloned()
            .collect()
    }

    fn reset_bursts(sent: &[Vec<u8>]) -> usize {
        sent.iter()
            .filter(|f| f[..] == [Command::SetSig as u8, 0x10, 0x10, Command::Stop as u8])
            .count()
    }

    #[test]
    fn test_init_sequence() {
        let (transport, state) = MockTransport::new();
        let _dev = DirtyJtagSpi::new(transport, &DirtyJtagConfig::default()).unwrap();

        let state = state.borrow();
        // Version query first, then the priming burst: signals low with TMS
        // and resets released, 100 kHz, stop
        assert_eq!(state.sent[0], [Command::Info as u8, Command::Stop as u8]);
        assert_eq!(
            state.sent[1],
            [
                Command::SetSig as u8,
                0x76,
                0x70,
                Command::Freq as u8,
                0x00,
                0x64,
                Command::Stop as u8
            ]
        );
    }

    #[test]
    fn test_rejects_unknown_protocol() {
        let (transport, state) = MockTransport::new();
        state.borrow_mut().info_reply = b"DJTAG2\n".to_vec();

        match DirtyJtagSpi::new(transport, &DirtyJtagConfig::default()) {
            Err(DirtyJtagError::UnsupportedProtocol(ident)) => assert_eq!(ident, "DJTAG2"),
            other => panic!("expected UnsupportedProtocol, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_chunk_framing() {
        let (mut dev, state) = open_session();
        let write: Vec<u8> = (0..45).map(|i| 0x80 | i as u8).collect();
        dev.spi_transfer(&write, 20).unwrap();

        let state = state.borrow();
        let frames = xfer_frames(&state.sent);
        // ceil(65 / 30) frames, each 30 bytes except the last (65 % 30 = 5)
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][1], 240);
        assert_eq!(frames[1][1], 240);
        assert_eq!(frames[2][1], 40);

        // Write payload fills the first 45 stream positions, zero filler after
        assert_eq!(&frames[0][2..32], &write[..30]);
        assert_eq!(&frames[1][2..17], &write[30..45]);
        assert!(frames[1][17..].iter().all(|&b| b == 0));
        assert!(frames[2][2..].iter().all(|&b| b == 0));
    }

    /// Read result must be bytes [w, w+r) of the reply stream regardless of
    /// where chunk boundaries fall.
    fn check_reassembly(write_len: usize, read_len: usize) {
        let (mut dev, _state) = open_session();
        let write = vec![0xA5u8; write_len];
        let result = dev.spi_transfer(&write, read_len).unwrap();

        let expected: Vec<u8> = (write_len..write_len + read_len)
            .map(|pos| pos as u8)
            .collect();
        assert_eq!(result, expected, "w={} r={}", write_len, read_len);
    }

    #[test]
    fn test_reassembly_across_boundaries() {
        // Boundary inside the write region and inside the read region
        check_reassembly(45, 20);
        // Boundary exactly at the write/read split
        check_reassembly(30, 30);
        // Boundaries only inside the read region
        check_reassembly(5, 60);
        // Single chunk
        check_reassembly(10, 5);
        // Pure read, pure write
        check_reassembly(0, 12);
        check_reassembly(12, 0);
        // Total on an exact chunk boundary
        check_reassembly(40, 20);
    }

    #[test]
    fn test_degenerate_empty_transaction() {
        let (mut dev, state) = open_session();
        let result = dev.spi_transfer(&[], 0).unwrap();
        assert!(result.is_empty());
        // No frames at all, including no reset burst
        assert!(state.borrow().sent.is_empty());
    }

    #[test]
    fn test_reset_sequence_on_success() {
        let (mut dev, state) = open_session();
        dev.spi_transfer(&[0x9F], 3).unwrap();

        let state = state.borrow();
        assert_eq!(reset_bursts(&state.sent), 1);
        // TMS burst comes after the transfer frames
        assert_eq!(
            state.sent.last().unwrap()[..],
            [Command::SetSig as u8, 0x10, 0x10, Command::Stop as u8]
        );
    }

    #[test]
    fn test_short_reply_aborts_with_reset() {
        let (mut dev, state) = open_session();
        state.borrow_mut().short_reply_on_xfer = Some(1);

        let write = vec![0x11u8; 50];
        match dev.spi_transfer(&write, 30) {
            Err(DirtyJtagError::ShortTransfer {
                op,
                expected,
                actual,
            }) => {
                assert_eq!(op, "receive");
                assert_eq!(expected, XFER_REPLY_SIZE);
                assert_eq!(actual, 16);
            }
            other => panic!("expected ShortTransfer, got {:?}", other.map(|_| ())),
        }

        let state = state.borrow();
        // Chunk loop stopped at the failing chunk, reset burst still sent once
        assert_eq!(xfer_frames(&state.sent).len(), 2);
        assert_eq!(reset_bursts(&state.sent), 1);
    }

    #[test]
    fn test_spi_master_interface() {
        let (mut dev, _state) = open_session();
        assert_eq!(dev.max_read_len(), 30);
        assert_eq!(dev.max_write_len(), 30);
        assert!(dev.features().contains(SpiFeatures::FOUR_BYTE_ADDR));
        assert_eq!(dev.protocol_version(), ProtocolVersion::V1);

        // command() is spi_transfer under the trait
        let id = dev.command(&[0x9F], 3).unwrap();
        assert_eq!(id, [1, 2, 3]);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("frequency", "1mhz")]).unwrap();
        assert_eq!(config.frequency_khz, 1000);

        let config = parse_options(&[]).unwrap();
        assert_eq!(config.frequency_khz, 100);

        assert!(parse_options(&[("frequency", "0")]).is_err());
        assert!(parse_options(&[("voltage", "3.3V")]).is_err());
    }
}
