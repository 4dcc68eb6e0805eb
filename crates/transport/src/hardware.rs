// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! A real `rusb`/libusb-backed [`Transport`] for talking to a connected
//! console. This module is glue: descriptor negotiation and libusb error
//! translation live here so the framing/command/fs crates never touch
//! `rusb` directly.

use std::time::Duration;

use log::{debug, warn};
use rusb::{DeviceHandle, GlobalContext};

use crate::{Transport, TransportError};

const VENDOR_ID: u16 = 0x1527;
const PRODUCT_ID: u16 = 0xBBDB;
const ENDPOINT_OUT: u8 = 0x02;
const ENDPOINT_IN: u8 = 0x82;
const INTERFACE_NUMBER: u8 = 0;
const PACKET_SIZE: usize = 0x40;

pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
    detached_kernel_driver: bool,
}

impl UsbTransport {
    /// Locate the console by vendor/product id, claim its interface, and
    /// detach the kernel driver if one is attached (Linux only; harmless
    /// no-op elsewhere).
    pub fn connect() -> Result<Self, TransportError> {
        let handle = rusb::open_device_with_vid_pid(VENDOR_ID, PRODUCT_ID)
            .ok_or(TransportError::NotConnected)?;

        let mut detached_kernel_driver = false;
        match handle.kernel_driver_active(INTERFACE_NUMBER) {
            Ok(true) => {
                if handle.detach_kernel_driver(INTERFACE_NUMBER).is_ok() {
                    detached_kernel_driver = true;
                }
            }
            Ok(false) => {}
            Err(_) => {
                // Not supported on this platform; nothing to detach.
            }
        }

        handle
            .set_active_configuration(1)
            .map_err(|e| TransportError::Send(format!("failed to set configuration: {e}")))?;
        handle
            .claim_interface(INTERFACE_NUMBER)
            .map_err(|e| TransportError::Send(format!("failed to claim interface: {e}")))?;

        debug!("USB connection established to console");
        Ok(UsbTransport {
            handle,
            detached_kernel_driver,
        })
    }

    fn classify(&mut self, result: Result<usize, rusb::Error>, is_send: bool) -> Result<usize, TransportError> {
        match result {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(rusb::Error::Pipe) => {
                let endpoint = if is_send { ENDPOINT_OUT } else { ENDPOINT_IN };
                let _ = self.handle.clear_halt(endpoint);
                Err(TransportError::Send("endpoint stalled (cleared halt)".into()))
            }
            Err(rusb::Error::Interrupted) => {
                warn!("USB transfer interrupted, treating as failed attempt");
                Err(TransportError::Send("transfer interrupted".into()))
            }
            Err(other) => Err(TransportError::Send(format!("fatal USB error: {other}"))),
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(INTERFACE_NUMBER);
        if self.detached_kernel_driver {
            let _ = self.handle.attach_kernel_driver(INTERFACE_NUMBER);
        }
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let result = self.handle.write_bulk(ENDPOINT_OUT, data, timeout);
        let written = self.classify(result, true)?;
        if written != data.len() {
            return Err(TransportError::Send(format!(
                "short write: {written} of {} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let result = self.handle.read_bulk(ENDPOINT_IN, buf, timeout);
        let n = self.classify(result, false)?;
        if n == 0 {
            return Err(TransportError::Receive("no data received before timeout".into()));
        }
        Ok(n)
    }

    fn packet_size(&self) -> usize {
        PACKET_SIZE
    }
}
