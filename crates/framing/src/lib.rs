// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The tagged byte-stream framing layer: piecemeal and chunked encoding,
//! the ready handshake, and length-prefixed reply parsing.
//!
//! Everything here is pure protocol; it knows nothing about NAND blocks
//! or filesystems, only about how bytes are tagged on the wire.

use std::time::Duration;

use aulon_transport::{Transport, TransportError};
use aulon_types::constants::{
    PIECEMEAL_RECV_TAG_BASE, PIECEMEAL_SEND_TAG_BASE, READY_SIGNAL, RECEIVE_LENGTH_PREFIX,
    SEND_CHUNK_MAX_LEN, SEND_CHUNK_SIGNAL, ACK_BYTE,
};
use log::trace;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected leading byte 0x{0:02x} in reply header")]
    BadHeaderTag(u8),
    #[error("unexpected tag 0x{0:02x} while parsing reply body")]
    BadBodyTag(u8),
    #[error("reply of {actual} bytes exceeds caller buffer of {capacity} bytes")]
    ReplyTooLarge { actual: usize, capacity: usize },
    #[error("reply body ended after {got} of {expected} expected bytes")]
    ShortBody { got: usize, expected: usize },
}

/// Encode `data` as a piecemeal byte stream: groups of up to 3 bytes, each
/// preceded by a tag byte `0x40 + group_len`.
pub fn encode_piecemeal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len().div_ceil(3));
    for group in data.chunks(3) {
        out.push(PIECEMEAL_SEND_TAG_BASE + group.len() as u8);
        out.extend_from_slice(group);
    }
    out
}

/// Send `data` as a single bulk write of piecemeal-encoded bytes.
pub fn send_piecemeal(
    transport: &mut dyn Transport,
    data: &[u8],
    timeout: Duration,
) -> Result<(), FramingError> {
    let encoded = encode_piecemeal(data);
    transport.send(&encoded, timeout)?;
    Ok(())
}

/// Send `data` as repeated `[0x63][len][bytes]` frames, each a separate
/// bulk write, `len` capped at 0xFE bytes.
pub fn send_chunked(
    transport: &mut dyn Transport,
    data: &[u8],
    timeout: Duration,
) -> Result<(), FramingError> {
    for chunk in data.chunks(SEND_CHUNK_MAX_LEN) {
        let mut frame = Vec::with_capacity(chunk.len() + 2);
        frame.push(SEND_CHUNK_SIGNAL);
        frame.push(chunk.len() as u8);
        frame.extend_from_slice(chunk);
        transport.send(&frame, timeout)?;
    }
    Ok(())
}

/// True if `packet` is exactly the device's four-byte ready signal.
pub fn is_ready(packet: &[u8]) -> bool {
    packet == READY_SIGNAL
}

/// Block until the device's ready signal is received.
pub fn wait_for_ready(transport: &mut dyn Transport, timeout: Duration) -> Result<(), FramingError> {
    let mut buf = [0u8; 4];
    loop {
        let n = transport.receive(&mut buf, timeout)?;
        if n == 4 && is_ready(&buf) {
            trace!("device ready");
            return Ok(());
        }
    }
}

/// Send a command frame: wait for ready, then piecemeal-send the
/// big-endian `(command, argument)` word pair.
pub fn send_command(
    transport: &mut dyn Transport,
    command: u32,
    argument: u32,
    timeout: Duration,
) -> Result<(), FramingError> {
    wait_for_ready(transport, timeout)?;
    let mut body = [0u8; 8];
    body[0..4].copy_from_slice(&command.to_be_bytes());
    body[4..8].copy_from_slice(&argument.to_be_bytes());
    send_piecemeal(transport, &body, timeout)
}

/// Send the single-byte reply acknowledgement.
pub fn send_ack(transport: &mut dyn Transport, timeout: Duration) -> Result<(), FramingError> {
    transport.send(&[ACK_BYTE], timeout)?;
    Ok(())
}

/// Receive one length-prefixed reply, skipping over any interleaved ready
/// signals, and decode its tagged body into `out[..len]`. Returns the
/// number of bytes written into `out`. Acks the reply before returning.
pub fn receive_reply(
    transport: &mut dyn Transport,
    out: &mut [u8],
    timeout: Duration,
) -> Result<usize, FramingError> {
    let len = receive_length_prefix(transport, timeout)?;
    if len > out.len() {
        return Err(FramingError::ReplyTooLarge {
            actual: len,
            capacity: out.len(),
        });
    }
    receive_body(transport, &mut out[..len], timeout)?;
    send_ack(transport, timeout)?;
    Ok(len)
}

fn receive_length_prefix(transport: &mut dyn Transport, timeout: Duration) -> Result<usize, FramingError> {
    let mut buf = [0u8; 4];
    loop {
        let n = transport.receive(&mut buf, timeout)?;
        if n == 4 && is_ready(&buf) {
            continue;
        }
        if buf[0] != RECEIVE_LENGTH_PREFIX {
            return Err(FramingError::BadHeaderTag(buf[0]));
        }
        let len = ((buf[1] as usize) << 16) | ((buf[2] as usize) << 8) | buf[3] as usize;
        return Ok(len);
    }
}

fn receive_body(transport: &mut dyn Transport, out: &mut [u8], timeout: Duration) -> Result<(), FramingError> {
    let packet_size = transport.packet_size();
    let mut staging = Vec::new();
    loop {
        let mut packet = vec![0u8; packet_size];
        let n = transport.receive(&mut packet, timeout)?;
        staging.extend_from_slice(&packet[..n]);
        if n < packet_size {
            break;
        }
    }
    parse_body(&staging, out)
}

/// Decode a tagged-group staging buffer into `out`, requiring exactly
/// `out.len()` bytes be produced.
fn parse_body(staging: &[u8], out: &mut [u8]) -> Result<(), FramingError> {
    let expected = out.len();
    let mut produced = 0;
    let mut pos = 0;
    while produced < expected {
        if pos + 4 > staging.len() {
            return Err(FramingError::ShortBody {
                got: produced,
                expected,
            });
        }
        let tag = staging[pos];
        if !(PIECEMEAL_RECV_TAG_BASE..=PIECEMEAL_RECV_TAG_BASE + 3).contains(&tag) {
            return Err(FramingError::BadBodyTag(tag));
        }
        let k = (tag - PIECEMEAL_RECV_TAG_BASE) as usize;
        let take = k.min(expected - produced);
        out[produced..produced + take].copy_from_slice(&staging[pos + 1..pos + 1 + take]);
        produced += take;
        pos += 4;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aulon_transport::MockTransport;

    #[test_log::test]
    fn piecemeal_encodes_boundary_lengths() {
        assert_eq!(encode_piecemeal(&[]), Vec::<u8>::new());
        assert_eq!(encode_piecemeal(&[0xAA]), vec![0x41, 0xAA]);
        assert_eq!(encode_piecemeal(&[0xAA, 0xBB]), vec![0x42, 0xAA, 0xBB]);
        assert_eq!(encode_piecemeal(&[0xAA, 0xBB, 0xCC]), vec![0x43, 0xAA, 0xBB, 0xCC]);
        assert_eq!(
            encode_piecemeal(&[0xAA, 0xBB, 0xCC, 0xDD]),
            vec![0x43, 0xAA, 0xBB, 0xCC, 0x41, 0xDD]
        );
    }

    #[test_log::test]
    fn wait_for_ready_skips_noise_then_matches() {
        let mut t = MockTransport::new();
        t.push_ready();
        wait_for_ready(&mut t, Duration::from_secs(1)).unwrap();
    }

    #[test_log::test]
    fn receive_reply_skips_interleaved_ready_signal() {
        let mut t = MockTransport::with_packet_size(64);
        t.push_ready();
        let body = encode_piecemeal(&[1, 2, 3, 4]);
        let mut frame = vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x04];
        frame.extend(body);
        t.push_stream(&frame[0..4]);
        t.push_stream(&frame[4..]);
        let mut out = [0u8; 4];
        let n = receive_reply(&mut t, &mut out, Duration::from_secs(1)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(t.sent.last().unwrap(), &vec![ACK_BYTE]);
    }

    #[test_log::test]
    fn receive_reply_rejects_oversized_reply() {
        let mut t = MockTransport::with_packet_size(64);
        t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x08]);
        let mut out = [0u8; 4];
        let err = receive_reply(&mut t, &mut out, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FramingError::ReplyTooLarge { .. }));
    }

    #[test_log::test]
    fn chunked_roundtrip_reassembles() {
        let mut t = MockTransport::new();
        let data = vec![7u8; 300];
        send_chunked(&mut t, &data, Duration::from_secs(1)).unwrap();
        let mut reassembled = Vec::new();
        for frame in &t.sent {
            assert_eq!(frame[0], SEND_CHUNK_SIGNAL);
            let len = frame[1] as usize;
            reassembled.extend_from_slice(&frame[2..2 + len]);
        }
        assert_eq!(reassembled, data);
    }
}
