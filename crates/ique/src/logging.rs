// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Optional USB transfer tracing for the `usb-log` build feature: wraps
//! a [`Transport`] and appends a line per send/receive to a log file.
//! Glue only — the protocol layers never know this wrapper exists.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use aulon_transport::{Transport, TransportError};

pub struct LoggingTransport {
    inner: Box<dyn Transport>,
    log: File,
}

impl LoggingTransport {
    pub fn wrap(inner: Box<dyn Transport>, log_path: &Path) -> std::io::Result<Self> {
        let log = OpenOptions::new().create(true).append(true).open(log_path)?;
        Ok(LoggingTransport { inner, log })
    }

    fn trace(&mut self, direction: &str, data: &[u8]) {
        let mut hex = String::with_capacity(data.len() * 2);
        for b in data {
            hex.push_str(&format!("{b:02x}"));
        }
        let _ = writeln!(self.log, "{direction} {hex}");
    }
}

impl Transport for LoggingTransport {
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.trace("send", data);
        self.inner.send(data, timeout)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let n = self.inner.receive(buf, timeout)?;
        self.trace("recv", &buf[..n]);
        Ok(n)
    }

    fn packet_size(&self) -> usize {
        self.inner.packet_size()
    }
}
