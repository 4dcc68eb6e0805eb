// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! A scripted, in-memory [`Transport`] for exercising the protocol layers
//! without real hardware.

use std::collections::VecDeque;
use std::time::Duration;

use crate::{Transport, TransportError};

/// Plays back a pre-scripted sequence of inbound packets and records every
/// outbound send, so framing/command/FS tests can assert on exactly what
/// was written to the wire.
pub struct MockTransport {
    packet_size: usize,
    inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::with_packet_size(512)
    }

    pub fn with_packet_size(packet_size: usize) -> Self {
        MockTransport {
            packet_size,
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Queue one exact packet to be returned by the next `receive` call.
    pub fn push_packet(&mut self, packet: Vec<u8>) {
        self.inbound.push_back(packet);
    }

    /// Queue the device's four-byte ready signal.
    pub fn push_ready(&mut self) {
        self.push_packet(aulon_types::constants::READY_SIGNAL.to_vec());
    }

    /// Split `data` into `self.packet_size`-sized packets (the final one
    /// short, even if that means empty) and queue them, matching how a
    /// real bulk endpoint signals end-of-transfer.
    pub fn push_stream(&mut self, data: &[u8]) {
        let mut offset = 0;
        loop {
            let end = (offset + self.packet_size).min(data.len());
            let packet = data[offset..end].to_vec();
            let is_short = packet.len() < self.packet_size;
            self.push_packet(packet);
            offset = end;
            if is_short {
                break;
            }
        }
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.iter().flatten().copied().collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl Transport for MockTransport {
    fn send(&mut self, data: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        let packet = self
            .inbound
            .pop_front()
            .ok_or(TransportError::Receive("mock transport exhausted".into()))?;
        if packet.len() > buf.len() {
            return Err(TransportError::Receive(
                "mock packet larger than caller buffer".into(),
            ));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }
}
