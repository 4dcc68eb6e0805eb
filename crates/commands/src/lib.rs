// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The command verb layer: one method per console command, built on top
//! of the framing layer, with retry policy for block I/O.

use std::time::Duration;

use aulon_framing::{receive_reply, send_ack, send_chunked, send_command, send_piecemeal, wait_for_ready, FramingError};
use aulon_transport::Transport;
use aulon_types::constants::{
    BLOCK_CHUNK_SIZE, BLOCK_IO_RETRIES, BLOCK_SIZE, CHUNKS_PER_BLOCK, ECC_SIG_LENGTH, NUM_BLOCKS,
    SHA1_HASH_LENGTH, SPARE_SIZE,
};
use aulon_types::Command;
use log::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("device reported error (status {0})")]
    DeviceError(i32),
    #[error("device reported {reported} blocks, expected {NUM_BLOCKS}")]
    UnexpectedBlockCount { reported: u32 },
    #[error("filename {len} bytes exceeds the 12-character limit")]
    FilenameTooLong { len: usize },
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// The standard 8-byte reply: bytes `[4..8)` are a big-endian signed
/// status word, negative on device-reported error.
fn status_of(reply: &[u8; 8]) -> i32 {
    i32::from_be_bytes([reply[4], reply[5], reply[6], reply[7]])
}

fn check_status(reply: &[u8; 8]) -> Result<i32, CommandError> {
    let status = status_of(reply);
    if status < 0 {
        return Err(CommandError::DeviceError(status));
    }
    Ok(status)
}

fn receive_status(transport: &mut dyn Transport, timeout: Duration) -> Result<i32, CommandError> {
    let mut reply = [0u8; 8];
    receive_reply(transport, &mut reply, timeout)?;
    check_status(&reply)
}

/// Like [`receive_status`], but a negative status is returned as-is
/// rather than classified as a device error. `FILE_CHKSUM` is the one
/// verb where "negative" is a meaningful answer ("no match"), not a
/// failure — see [`Commands::file_chksum`].
fn receive_status_raw(transport: &mut dyn Transport, timeout: Duration) -> Result<i32, CommandError> {
    let mut reply = [0u8; 8];
    receive_reply(transport, &mut reply, timeout)?;
    Ok(status_of(&reply))
}

/// Retry a block I/O attempt up to [`BLOCK_IO_RETRIES`] times, returning
/// the first success or the last failure.
fn retry_block_io<T>(mut attempt: impl FnMut() -> Result<T, CommandError>) -> Result<T, CommandError> {
    let mut last_err = None;
    for attempt_no in 1..=BLOCK_IO_RETRIES {
        match attempt() {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!("block I/O attempt {attempt_no}/{BLOCK_IO_RETRIES} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("BLOCK_IO_RETRIES is nonzero"))
}

/// A typed wrapper over a [`Transport`] exposing the command verbs.
pub struct Commands<'a> {
    transport: &'a mut dyn Transport,
    timeout: Duration,
}

impl<'a> Commands<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Commands {
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(transport: &'a mut dyn Transport, timeout: Duration) -> Self {
        Commands { transport, timeout }
    }

    fn send_command(&mut self, command: Command, argument: u32) -> Result<(), CommandError> {
        send_command(self.transport, command.as_u32(), argument, self.timeout)?;
        Ok(())
    }

    fn receive_status(&mut self) -> Result<i32, CommandError> {
        receive_status(self.transport, self.timeout)
    }

    fn read_block_raw(&mut self, block: u16) -> Result<Vec<u8>, CommandError> {
        let mut block_buf = vec![0u8; BLOCK_SIZE];
        for i in 0..CHUNKS_PER_BLOCK {
            let offset = i * BLOCK_CHUNK_SIZE;
            receive_reply(self.transport, &mut block_buf[offset..offset + BLOCK_CHUNK_SIZE], self.timeout)?;
        }
        Ok(block_buf)
    }

    /// `READ_BLOCK_ONLY`: read one block's 16 KiB of data.
    pub fn read_block_only(&mut self, block: u16) -> Result<Vec<u8>, CommandError> {
        retry_block_io(|| {
            self.send_command(Command::ReadBlockOnly, block as u32)?;
            self.receive_status()?;
            self.read_block_raw(block)
        })
    }

    /// `READ_BLOCK_AND_SPARE`: read one block's data and its 16-byte spare.
    pub fn read_block_spare(&mut self, block: u16) -> Result<(Vec<u8>, [u8; SPARE_SIZE]), CommandError> {
        retry_block_io(|| {
            self.send_command(Command::ReadBlockAndSpare, block as u32)?;
            self.receive_status()?;
            let data = self.read_block_raw(block)?;
            let mut spare = [0u8; SPARE_SIZE];
            receive_reply(self.transport, &mut spare, self.timeout)?;
            Ok((data, spare))
        })
    }

    fn write_block_raw(&mut self, data: &[u8]) -> Result<(), CommandError> {
        debug_assert_eq!(data.len(), BLOCK_SIZE);
        send_chunked(self.transport, data, self.timeout)?;
        Ok(())
    }

    /// `WRITE_BLOCK_ONLY`: write one block's 16 KiB of data.
    pub fn write_block_only(&mut self, block: u16, data: &[u8]) -> Result<(), CommandError> {
        retry_block_io(|| {
            self.send_command(Command::WriteBlockOnly, block as u32)?;
            wait_for_ready(self.transport, self.timeout)?;
            self.write_block_raw(data)?;
            self.receive_status().map(|_| ())
        })
    }

    /// `WRITE_BLOCK_AND_SPARE`: write one block's data and spare.
    ///
    /// If `spare[5] != 0xFF` the block is marked bad by the caller's own
    /// bookkeeping; no transfer is attempted and this returns `Ok(())`.
    ///
    /// The device expects a ready signal before each of the three
    /// transfers that make up this verb: the command frame, the block
    /// data, and the spare data.
    pub fn write_block_spare(&mut self, block: u16, data: &[u8], spare: &[u8; SPARE_SIZE]) -> Result<(), CommandError> {
        if spare[5] != 0xFF {
            debug!("block {block:04x} marked bad, skipping write");
            return Ok(());
        }
        retry_block_io(|| {
            self.send_command(Command::WriteBlockAndSpare, block as u32)?;
            wait_for_ready(self.transport, self.timeout)?;
            self.write_block_raw(data)?;

            let mut forced_spare = *spare;
            forced_spare[3..SPARE_SIZE].fill(0xFF);
            wait_for_ready(self.transport, self.timeout)?;
            send_piecemeal(self.transport, &forced_spare, self.timeout)?;

            self.receive_status().map(|_| ())
        })
    }

    /// `INIT_FS`: ask the device to (re)load its filesystem state.
    pub fn init_fs(&mut self) -> Result<(), CommandError> {
        self.send_command(Command::InitFs, 0)?;
        self.receive_status()?;
        Ok(())
    }

    /// `GET_NUM_BLOCKS`: fails fatally if the device's block count is not
    /// [`NUM_BLOCKS`] — the rest of the protocol assumes a fixed geometry.
    pub fn get_num_blocks(&mut self) -> Result<u32, CommandError> {
        self.send_command(Command::GetNumBlocks, 0)?;
        let status = self.receive_status()?;
        let reported = status as u32;
        if reported as usize != NUM_BLOCKS {
            return Err(CommandError::UnexpectedBlockCount { reported });
        }
        Ok(reported)
    }

    pub fn set_seqno(&mut self, value: u32) -> Result<(), CommandError> {
        self.send_command(Command::SetSeqno, value)?;
        self.receive_status()?;
        Ok(())
    }

    pub fn get_seqno(&mut self) -> Result<u32, CommandError> {
        self.send_command(Command::GetSeqno, 0)?;
        Ok(self.receive_status()? as u32)
    }

    /// `FILE_CHKSUM`: asks the device whether a file with this exact
    /// name, checksum, and size already exists. Returns `true` on match.
    ///
    /// Unlike every other verb, a negative status here is not a device
    /// error: it is the device's "no match" answer, so this reads the
    /// raw status word instead of routing it through the usual
    /// negative-means-error check.
    pub fn file_chksum(&mut self, name: &str, checksum: u32, size: u32) -> Result<bool, CommandError> {
        let wire_len = name.len() + 1;
        if name.len() > 12 {
            return Err(CommandError::FilenameTooLong { len: name.len() });
        }
        self.send_command(Command::FileChksum, wire_len as u32)?;
        wait_for_ready(self.transport, self.timeout)?;
        send_piecemeal(self.transport, name.as_bytes(), self.timeout)?;
        wait_for_ready(self.transport, self.timeout)?;
        let mut params = [0u8; 8];
        params[0..4].copy_from_slice(&checksum.to_be_bytes());
        params[4..8].copy_from_slice(&size.to_be_bytes());
        send_piecemeal(self.transport, &params, self.timeout)?;
        let status = receive_status_raw(self.transport, self.timeout)?;
        Ok(status >= 0)
    }

    pub fn set_led(&mut self, value: u32) -> Result<(), CommandError> {
        self.send_command(Command::SetLed, value)?;
        self.receive_status()?;
        Ok(())
    }

    /// `SET_TIME`: `first_half` travels as the command argument; the four
    /// trailing bytes follow piecemeal-encoded after the status reply.
    pub fn set_time(&mut self, first_half: u32, second_half: [u8; 4]) -> Result<(), CommandError> {
        self.send_command(Command::SetTime, first_half)?;
        self.receive_status()?;
        send_piecemeal(self.transport, &second_half, self.timeout)?;
        Ok(())
    }

    pub fn get_bbid(&mut self) -> Result<u32, CommandError> {
        self.send_command(Command::GetBbid, 0)?;
        Ok(self.receive_status()? as u32)
    }

    /// `SIGN_HASH`: send a 20-byte SHA1 hash, receive a 64-byte ECC
    /// signature after the status reply.
    pub fn sign_hash(&mut self, hash: &[u8; SHA1_HASH_LENGTH]) -> Result<[u8; ECC_SIG_LENGTH], CommandError> {
        self.send_command(Command::SignHash, SHA1_HASH_LENGTH as u32)?;
        wait_for_ready(self.transport, self.timeout)?;
        send_chunked(self.transport, hash, self.timeout)?;
        self.receive_status()?;
        let mut sig = [0u8; ECC_SIG_LENGTH];
        receive_reply(self.transport, &mut sig, self.timeout)?;
        Ok(sig)
    }

    /// Acknowledge a reply out of band; exposed for verbs that need to
    /// manually interleave sends and acks (none currently do, kept for
    /// parity with the framing layer's primitives).
    #[allow(dead_code)]
    fn ack(&mut self) -> Result<(), CommandError> {
        send_ack(self.transport, self.timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aulon_transport::MockTransport;
    use aulon_types::constants::RECEIVE_LENGTH_PREFIX;

    fn push_status(t: &mut MockTransport, status: i32) {
        t.push_ready();
        t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x08]);
        let mut body = [0u8; 8];
        body[4..8].copy_from_slice(&status.to_be_bytes());
        t.push_stream(&aulon_framing::encode_piecemeal(&body));
    }

    #[test_log::test]
    fn get_bbid_returns_status_word() {
        let mut t = MockTransport::with_packet_size(64);
        push_status(&mut t, 0x1234_5678);
        let mut cmds = Commands::new(&mut t);
        let bbid = cmds.get_bbid().unwrap();
        assert_eq!(bbid, 0x1234_5678);
    }

    #[test_log::test]
    fn get_num_blocks_rejects_unexpected_count() {
        let mut t = MockTransport::with_packet_size(64);
        push_status(&mut t, 0x0500);
        let mut cmds = Commands::new(&mut t);
        let err = cmds.get_num_blocks().unwrap_err();
        assert!(matches!(err, CommandError::UnexpectedBlockCount { reported: 0x0500 }));
    }

    #[test_log::test]
    fn write_block_spare_skips_transfer_for_bad_block() {
        let mut t = MockTransport::new();
        let mut cmds = Commands::new(&mut t);
        let data = vec![0u8; BLOCK_SIZE];
        let mut spare = [0xFFu8; SPARE_SIZE];
        spare[5] = 0x00;
        cmds.write_block_spare(0x50, &data, &spare).unwrap();
        assert!(t.sent.is_empty());
    }

    #[test_log::test]
    fn read_block_only_reassembles_four_chunks() {
        let mut t = MockTransport::with_packet_size(64);
        push_status(&mut t, 0);
        let expected: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 256) as u8).collect();
        for chunk in expected.chunks(BLOCK_CHUNK_SIZE) {
            let len = chunk.len();
            t.push_packet(vec![RECEIVE_LENGTH_PREFIX, (len >> 16) as u8, (len >> 8) as u8, len as u8]);
            t.push_stream(&aulon_framing::encode_piecemeal(chunk));
        }
        let mut cmds = Commands::new(&mut t);
        let data = cmds.read_block_only(0x0123).unwrap();
        assert_eq!(data, expected);
    }

    #[test_log::test]
    fn file_chksum_negative_status_means_no_match_not_an_error() {
        let mut t = MockTransport::with_packet_size(64);
        t.push_ready(); // before filename
        t.push_ready(); // before checksum/size params
        push_status(&mut t, -1);
        let mut cmds = Commands::new(&mut t);
        let matched = cmds.file_chksum("temp.tmp", 0x1234, 0x4000).unwrap();
        assert!(!matched);
    }

    #[test_log::test]
    fn file_chksum_non_negative_status_means_match() {
        let mut t = MockTransport::with_packet_size(64);
        t.push_ready();
        t.push_ready();
        push_status(&mut t, 0);
        let mut cmds = Commands::new(&mut t);
        let matched = cmds.file_chksum("game.bin", 0x1234, 0x4000).unwrap();
        assert!(matched);
    }

    #[test_log::test]
    fn device_error_status_is_surfaced() {
        let mut t = MockTransport::with_packet_size(64);
        push_status(&mut t, -1);
        let mut cmds = Commands::new(&mut t);
        let err = cmds.get_bbid().unwrap_err();
        assert!(matches!(err, CommandError::DeviceError(-1)));
    }
}
