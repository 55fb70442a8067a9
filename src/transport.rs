//! USB transport layer for the DirtyJTAG probe
//!
//! The device layer drives the probe through the `Transport` trait so that
//! the command framing can be exercised against an in-memory double in tests.
//! `UsbTransport` is the real implementation over nusb bulk transfers.

use nusb::transfer::{Queue, RequestBuffer};
use nusb::{Device, Interface};

use crate::error::{DirtyJtagError, Result};
use crate::protocol::{
    BULK_IN_EP, BULK_OUT_EP, DIRTYJTAG_USB_PRODUCT, DIRTYJTAG_USB_VENDOR,
};

/// Transport over which wire frames are exchanged with the probe
///
/// Both calls are blocking and move one bulk transfer at a time; the DJTAG1
/// protocol has no pipelining, so the device layer strictly alternates
/// send-then-receive.
pub trait Transport {
    /// Send a complete frame buffer
    ///
    /// A partial bulk-out transfer is an error, not silently tolerated.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one bulk-in packet of at most `len` bytes
    ///
    /// Returns however many bytes the probe produced; length validation is
    /// the caller's responsibility.
    fn receive(&mut self, len: usize) -> Result<Vec<u8>>;
}

/// USB vendor/product pair identifying a supported probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Known DirtyJTAG probes
pub const DIRTYJTAG_DEVICES: &[UsbDeviceId] = &[UsbDeviceId {
    vendor_id: DIRTYJTAG_USB_VENDOR,
    product_id: DIRTYJTAG_USB_PRODUCT,
}];

/// Bulk transport over a claimed USB interface
pub struct UsbTransport {
    /// USB device handle, kept open for the lifetime of the interface
    _device: Device,
    /// Claimed USB interface
    interface: Interface,
}

impl UsbTransport {
    /// Open the first probe matching `devices` and claim interface 0
    ///
    /// The device-id table is passed in by the caller rather than read from
    /// global state, so alternative probe firmware can reuse this transport.
    pub fn open(devices: &[UsbDeviceId]) -> Result<Self> {
        let dev_info = nusb::list_devices()
            .map_err(|e| DirtyJtagError::OpenFailed(e.to_string()))?
            .find(|d| {
                devices
                    .iter()
                    .any(|id| id.vendor_id == d.vendor_id() && id.product_id == d.product_id())
            })
            .ok_or(DirtyJtagError::DeviceNotFound)?;

        log::info!(
            "Opening DirtyJTAG probe at bus {} address {}",
            dev_info.bus_number(),
            dev_info.device_address()
        );

        let device = dev_info
            .open()
            .map_err(|e| DirtyJtagError::OpenFailed(e.to_string()))?;

        // Detach a bound kernel driver where the platform supports it,
        // then claim the interface
        let interface = device
            .detach_and_claim_interface(0)
            .map_err(|e| DirtyJtagError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            _device: device,
            interface,
        })
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut queue: Queue<Vec<u8>> = self.interface.bulk_out_queue(BULK_OUT_EP);
        queue.submit(data.to_vec());

        let completion = futures_lite::future::block_on(async { queue.next_complete().await });

        completion
            .status
            .map_err(|e| DirtyJtagError::TransferFailed(e.to_string()))?;

        let transferred = completion.data.actual_length();
        if transferred != data.len() {
            return Err(DirtyJtagError::ShortTransfer {
                op: "send",
                expected: data.len(),
                actual: transferred,
            });
        }

        log::trace!("USB write {} bytes", data.len());
        Ok(())
    }

    fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut queue: Queue<RequestBuffer> = self.interface.bulk_in_queue(BULK_IN_EP);
        queue.submit(RequestBuffer::new(len));

        let completion = futures_lite::future::block_on(async { queue.next_complete().await });

        completion
            .status
            .map_err(|e| DirtyJtagError::TransferFailed(e.to_string()))?;

        log::trace!("USB read {} bytes", completion.data.len());
        Ok(completion.data)
    }
}
