// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The single owner of the console connection and its filesystem image,
//! replacing the original tool's process-global state with one value
//! threaded through every menu command.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use aulon_commands::{CommandError, Commands};
use aulon_fs::{FsError, FsImage, Stats};
use aulon_transport::hardware::UsbTransport;
use aulon_transport::{Transport, TransportError};
use aulon_types::constants::{NUM_BLOCKS, SKSA_END, SPARE_SIZE};
use aulon_types::Filename;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::time::now_as_console_time;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not connected to a console")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid filename: {0}")]
    Filename(#[from] aulon_types::FilenameError),
    #[error("host file size does not match the expected NAND image size")]
    SizeMismatch,
}

/// Which portion of NAND a full-device write covers.
#[cfg_attr(not(feature = "write"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRange {
    /// From block 0, including the SKSA. Unsafe.
    FullNand,
    /// From the first file-data block, excluding the SKSA.
    PartialNand,
}

impl WriteRange {
    fn start_block(self) -> u16 {
        match self {
            WriteRange::FullNand => 0,
            WriteRange::PartialNand => SKSA_END,
        }
    }
}

pub struct Session {
    transport: Option<Box<dyn Transport>>,
    fs: Option<FsImage>,
}

fn commands(transport: &mut Option<Box<dyn Transport>>) -> Result<Commands<'_>, SessionError> {
    let t = transport.as_deref_mut().ok_or(SessionError::NotConnected)?;
    Ok(Commands::new(t))
}

impl Session {
    pub fn new() -> Self {
        Session { transport: None, fs: None }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Parse a display filename typed at the REPL into a validated
    /// on-device [`Filename`].
    pub fn parse_filename(&self, display: &str) -> Result<Filename, SessionError> {
        Ok(Filename::parse(display)?)
    }

    fn fs_mut(&mut self) -> Result<&mut FsImage, SessionError> {
        self.fs.as_mut().ok_or(SessionError::NotConnected)
    }

    fn fs_ref(&self) -> Result<&FsImage, SessionError> {
        self.fs.as_ref().ok_or(SessionError::NotConnected)
    }

    /// `B` — connect, reset the device's sequence number, load the
    /// current filesystem image, reinitialize the device's FS state, and
    /// clean up any straggling `temp.tmp` from an interrupted write.
    ///
    /// `log_path`, when the `usb-log` feature is enabled and `Some`,
    /// wraps the connection in a transfer tracer.
    pub fn init(&mut self, log_path: Option<&Path>) -> Result<(), SessionError> {
        #[cfg(not(feature = "usb-log"))]
        let _ = log_path;

        let transport = UsbTransport::connect()?;
        let boxed: Box<dyn Transport> = Box::new(transport);
        #[cfg(feature = "usb-log")]
        let boxed: Box<dyn Transport> = match log_path {
            Some(path) => Box::new(crate::logging::LoggingTransport::wrap(boxed, path)?),
            None => boxed,
        };
        self.transport = Some(boxed);

        {
            let mut cmds = commands(&mut self.transport)?;
            cmds.set_seqno(1)?;
            cmds.get_num_blocks()?;
            let fs = FsImage::load(&mut cmds)?;
            self.fs = Some(fs);
            cmds.init_fs()?;
        }

        let temp_name = Filename::parse("temp.tmp")?;
        let fs = self.fs.as_mut().ok_or(SessionError::NotConnected)?;
        let mut cmds = commands(&mut self.transport)?;
        fs.delete_and_update(&mut cmds, &temp_name)?;
        info!("console connection initialized");
        Ok(())
    }

    /// `Q` — tear down the transport.
    pub fn close(&mut self) {
        self.transport = None;
        self.fs = None;
    }

    /// `I` — the console's unique identifier.
    pub fn get_bbid(&mut self) -> Result<u32, SessionError> {
        Ok(commands(&mut self.transport)?.get_bbid()?)
    }

    /// `H` — flash the LED.
    pub fn set_led(&mut self, value: u32) -> Result<(), SessionError> {
        commands(&mut self.transport)?.set_led(value)?;
        Ok(())
    }

    /// `J` — set the console clock to the host's current UTC time.
    pub fn set_time(&mut self) -> Result<(), SessionError> {
        let bytes = now_as_console_time();
        let first_half = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let second_half = [bytes[4], bytes[5], bytes[6], bytes[7]];
        commands(&mut self.transport)?.set_time(first_half, second_half)?;
        Ok(())
    }

    /// `S` — sign a 20-byte SHA1 hash read from a host file.
    pub fn sign_hash(&mut self, hash_path: &Path) -> Result<(Vec<u8>, [u8; 64]), SessionError> {
        let mut hash = [0u8; aulon_types::constants::SHA1_HASH_LENGTH];
        File::open(hash_path)?.read_exact(&mut hash)?;
        let sig = commands(&mut self.transport)?.sign_hash(&hash)?;
        Ok((hash.to_vec(), sig))
    }

    /// `L` — files currently present on the console.
    pub fn list_files(&self) -> Result<Vec<aulon_fs::FileEntry>, SessionError> {
        Ok(self.fs_ref()?.list_files())
    }

    /// `K` — the block chain of a file.
    pub fn list_file_blocks(&self, name: &Filename) -> Result<Vec<u16>, SessionError> {
        Ok(self.fs_ref()?.list_file_blocks(name)?)
    }

    /// `F` — dump the current filesystem block to a host file.
    pub fn dump_current_fs(&self, path: &Path) -> Result<(), SessionError> {
        std::fs::write(path, self.fs_ref()?.dump_current_fs())?;
        Ok(())
    }

    /// `C` — free/used/bad block counts and the current sequence number.
    pub fn stats(&self) -> Result<Stats, SessionError> {
        Ok(self.fs_ref()?.stats())
    }

    /// `1` — dump every block and spare to `nand.bin`/`spare.bin`.
    pub fn dump_nand(&mut self, nand_path: &Path, spare_path: &Path) -> Result<(), SessionError> {
        let mut nand_file = File::create(nand_path)?;
        let mut spare_file = File::create(spare_path)?;
        let bar = progress_bar(NUM_BLOCKS as u64, "Reading NAND");
        let mut cmds = commands(&mut self.transport)?;
        for block in 0..NUM_BLOCKS as u16 {
            let (data, spare) = cmds.read_block_spare(block)?;
            nand_file.write_all(&data)?;
            spare_file.write_all(&spare)?;
            bar.inc(1);
        }
        bar.finish();
        Ok(())
    }

    /// `X` — dump one block and its spare to `block_XXXX`/`spare_XXXX`.
    pub fn read_single_block(&mut self, block: u16) -> Result<(), SessionError> {
        let (data, spare) = commands(&mut self.transport)?.read_block_spare(block)?;
        std::fs::write(format!("block_{block:04x}"), &data)?;
        std::fs::write(format!("spare_{block:04x}"), &spare)?;
        Ok(())
    }

    /// `3` — read a console file to a like-named host file.
    pub fn read_file(&mut self, name: &Filename) -> Result<(), SessionError> {
        let mut out = File::create(name.to_string())?;
        let fs = self.fs.as_ref().ok_or(SessionError::NotConnected)?;
        let mut cmds = commands(&mut self.transport)?;
        fs.read_file(&mut cmds, name, &mut out)?;
        Ok(())
    }

    /// `2`/`W` (write feature only) — write `nand.bin`/`spare.bin` to the
    /// console. `range` selects whether the SKSA is included.
    #[cfg(feature = "write")]
    pub fn write_nand(&mut self, nand_path: &Path, spare_path: &Path, range: WriteRange) -> Result<(), SessionError> {
        let start = range.start_block();
        let count = NUM_BLOCKS - start as usize;

        let nand_meta = std::fs::metadata(nand_path)?;
        let spare_meta = std::fs::metadata(spare_path)?;
        if nand_meta.len() as usize != count * aulon_types::constants::BLOCK_SIZE
            || spare_meta.len() as usize != count * SPARE_SIZE
        {
            return Err(SessionError::SizeMismatch);
        }

        let mut nand_file = File::open(nand_path)?;
        let mut spare_file = File::open(spare_path)?;
        let bar = progress_bar(count as u64, "Writing NAND");
        let mut cmds = commands(&mut self.transport)?;
        for offset in 0..count {
            let block = start + offset as u16;
            let mut data = vec![0u8; aulon_types::constants::BLOCK_SIZE];
            nand_file.read_exact(&mut data)?;
            let mut spare = [0u8; SPARE_SIZE];
            spare_file.read_exact(&mut spare)?;
            cmds.write_block_spare(block, &data, &spare)?;
            bar.inc(1);
        }
        bar.finish();
        Ok(())
    }

    /// `Y` (write feature only) — write `block_XXXX` to the console.
    #[cfg(feature = "write")]
    pub fn write_single_block(&mut self, block: u16) -> Result<(), SessionError> {
        let data = std::fs::read(format!("block_{block:04x}"))?;
        let spare_bytes = std::fs::read(format!("spare_{block:04x}"))?;
        let mut spare = [0xFFu8; SPARE_SIZE];
        let n = spare_bytes.len().min(SPARE_SIZE);
        spare[..n].copy_from_slice(&spare_bytes[..n]);
        commands(&mut self.transport)?.write_block_spare(block, &data, &spare)?;
        Ok(())
    }

    /// `4` (write feature only) — write a host file to the console.
    #[cfg(feature = "write")]
    pub fn write_file(&mut self, name: &Filename) -> Result<(), SessionError> {
        let mut data = Vec::new();
        File::open(name.to_string())?.read_to_end(&mut data)?;
        let fs = self.fs.as_mut().ok_or(SessionError::NotConnected)?;
        let mut cmds = commands(&mut self.transport)?;
        fs.write_file(&mut cmds, name, &data)?;
        Ok(())
    }

    /// `R` (write feature only) — delete a console file and persist.
    #[cfg(feature = "write")]
    pub fn delete_file(&mut self, name: &Filename) -> Result<(), SessionError> {
        let fs = self.fs.as_mut().ok_or(SessionError::NotConnected)?;
        let mut cmds = commands(&mut self.transport)?;
        fs.delete_and_update(&mut cmds, name)?;
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({percent}%)") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}
