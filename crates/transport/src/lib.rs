// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The USB bulk transport abstraction the protocol layers are built on.
//!
//! Everything above this crate only ever sees [`Transport`]; how bytes
//! actually reach the console (real USB hardware, or a scripted mock for
//! tests) is an implementation detail behind the trait.

use std::time::Duration;

pub mod mock;

#[cfg(feature = "hardware")]
pub mod hardware;

pub use mock::MockTransport;
#[cfg(feature = "hardware")]
pub use hardware::UsbTransport;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("USB send failed: {0}")]
    Send(String),
    #[error("USB receive failed: {0}")]
    Receive(String),
    #[error("device not connected")]
    NotConnected,
}

/// A bidirectional bulk-transfer channel to the console.
///
/// Implementations are synchronous: `send`/`receive` block for up to the
/// given timeout. There is never more than one transfer in flight, so a
/// `&mut self` receiver is sufficient; no interior synchronization is
/// required.
pub trait Transport {
    /// Send the entirety of `data` as a single bulk write.
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes into `buf`, returning the number of
    /// bytes actually read. A short read is a meaningful signal to callers
    /// (it ends a reply's packet stream); it is not itself an error.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// The natural bulk-transfer packet size of this transport. Framing
    /// uses this to decide when a reply's packet stream has ended.
    fn packet_size(&self) -> usize;
}
