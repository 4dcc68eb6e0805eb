// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The in-memory filesystem engine: superblock bootstrap and selection,
//! directory/chain bookkeeping, and the file read/write/delete
//! operations built on top of the command layer.

pub mod error;
pub mod superblock;

pub use error::FsError;
pub use superblock::{DirEntryRaw, Superblock};

use std::io::Write;

use aulon_commands::Commands;
use aulon_types::constants::{
    BLOCK_SIZE, FILE_DATA_BLOCK_COUNT, MAX_CHAIN_HOPS, NUM_BLOCKS, SKSA_END, SPARE_SIZE,
    SUPERBLOCK_SLOT_COUNT, SUPERBLOCK_SLOT_START,
};
use aulon_types::{FatCell, Filename};
use log::warn;

/// Sentinel recorded in a directory entry's start-block field when a file
/// has no allocated blocks (e.g. a zero-length file).
const NO_START_BLOCK: u16 = 0xFFFF;

pub struct Stats {
    pub free_blocks: usize,
    pub used_blocks: usize,
    pub bad_blocks: usize,
    pub seqno: u32,
}

pub struct FileEntry {
    pub name: Filename,
    pub size: u32,
    pub start_block: u16,
}

/// The single owner of the console's superblock image: the one piece of
/// "process-global" state the original tool kept as module statics.
pub struct FsImage {
    superblock: Superblock,
    current_index: u16,
}

impl FsImage {
    /// Scan the 16 rotating superblock slots (descending from `0xFFF`)
    /// and keep the one with the greatest sequence number.
    pub fn load(cmds: &mut Commands) -> Result<Self, FsError> {
        let mut best: Option<(Superblock, u16, u32)> = None;
        for slot in (SUPERBLOCK_SLOT_START..=0xFFFu16).rev() {
            let (data, spare) = match cmds.read_block_spare(slot) {
                Ok(v) => v,
                Err(e) => {
                    warn!("could not read superblock slot {slot:04x}: {e}");
                    continue;
                }
            };
            let sb = Superblock::from_parts(data, spare);
            let seqno = sb.seqno();
            let is_better = best.as_ref().map(|(_, _, best_seqno)| seqno > *best_seqno).unwrap_or(true);
            if is_better {
                let index = slot - SUPERBLOCK_SLOT_START;
                best = Some((sb, index, seqno));
            }
        }
        let (superblock, current_index, _) = best.ok_or(FsError::BootstrapFailed)?;
        Ok(FsImage { superblock, current_index })
    }

    /// Build directly from an already-fetched superblock; used by tests
    /// and by callers that already hold a freshly written image.
    pub fn from_superblock(superblock: Superblock, current_index: u16) -> Self {
        FsImage { superblock, current_index }
    }

    pub fn current_index(&self) -> u16 {
        self.current_index
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn find_entry(&self, name: &Filename) -> Option<usize> {
        self.superblock.find_entry(name)
    }

    /// Walk a file's block chain from `start`, stopping at the terminal
    /// cell. Fails if the chain does not terminate within
    /// [`MAX_CHAIN_HOPS`] or if it runs into a free or bad cell.
    pub fn chain(&self, start: u16) -> Result<Vec<u16>, FsError> {
        if start == NO_START_BLOCK {
            return Ok(Vec::new());
        }
        let mut blocks = Vec::new();
        let mut current = start;
        loop {
            blocks.push(current);
            if blocks.len() > MAX_CHAIN_HOPS {
                return Err(FsError::CorruptChain(MAX_CHAIN_HOPS));
            }
            match self.superblock.fat_cell(current) {
                FatCell::End => break,
                FatCell::Next(next) => current = next,
                FatCell::Free | FatCell::Bad => return Err(FsError::InvalidChainCell(current)),
            }
        }
        Ok(blocks)
    }

    pub fn free_block_count(&self) -> usize {
        (0..NUM_BLOCKS as u16).filter(|&b| self.superblock.fat_cell(b).is_free()).count()
    }

    pub fn next_free_block(&self, start: u16) -> Option<u16> {
        (start..NUM_BLOCKS as u16).find(|&b| self.superblock.fat_cell(b).is_free())
    }

    pub fn list_files(&self) -> Vec<FileEntry> {
        self.superblock
            .entries()
            .filter(|(_, e)| e.is_valid())
            .map(|(_, e)| FileEntry {
                name: e.filename(),
                size: e.size(),
                start_block: e.start_block(),
            })
            .collect()
    }

    pub fn list_file_blocks(&self, name: &Filename) -> Result<Vec<u16>, FsError> {
        let idx = self.find_entry(name).ok_or(FsError::NotFound)?;
        let start = self.superblock.entry(idx).start_block();
        self.chain(start)
    }

    pub fn stats(&self) -> Stats {
        let mut free = 0;
        let mut bad = 0;
        let mut used = 0;
        for b in 0..NUM_BLOCKS as u16 {
            match self.superblock.fat_cell(b) {
                FatCell::Free => free += 1,
                FatCell::Bad => bad += 1,
                FatCell::End | FatCell::Next(_) => used += 1,
            }
        }
        Stats {
            free_blocks: free,
            used_blocks: used,
            bad_blocks: bad,
            seqno: self.superblock.seqno(),
        }
    }

    pub fn dump_current_fs(&self) -> &[u8] {
        self.superblock.block_bytes()
    }

    /// Read a console file's blocks to `out` in full, block-sized chunks,
    /// without trimming the final block against the declared size.
    pub fn read_file(&self, cmds: &mut Commands, name: &Filename, out: &mut impl Write) -> Result<(), FsError> {
        let idx = self.find_entry(name).ok_or(FsError::NotFound)?;
        let start = self.superblock.entry(idx).start_block();
        for block in self.chain(start)? {
            let (data, _spare) = cmds.read_block_spare(block)?;
            out.write_all(&data)?;
        }
        Ok(())
    }

    /// Free a file's chain and clear its directory entry in memory.
    /// Returns whether an entry by this name existed.
    pub fn delete(&mut self, name: &Filename) -> Result<bool, FsError> {
        let Some(idx) = self.find_entry(name) else {
            return Ok(false);
        };
        let start = self.superblock.entry(idx).start_block();
        for block in self.chain(start)? {
            self.superblock.set_fat_cell(block, FatCell::Free);
        }
        self.superblock.clear_entry(idx);
        Ok(true)
    }

    /// Delete, then persist, but only if something was actually deleted.
    pub fn delete_and_update(&mut self, cmds: &mut Commands, name: &Filename) -> Result<(), FsError> {
        if self.delete(name)? {
            self.update_fs(cmds)?;
        }
        Ok(())
    }

    /// Persist the in-memory superblock: bump its sequence number, write
    /// it to the next rotating slot, and ask the device to reload.
    ///
    /// On a failed write, the superblock is dumped to `current_fs.bin`
    /// for manual recovery. A failed `INIT_FS` afterward is only a
    /// warning: a device reset will resynchronize.
    pub fn update_fs(&mut self, cmds: &mut Commands) -> Result<(), FsError> {
        let next_seqno = self.superblock.seqno().wrapping_add(1);
        self.superblock.set_seqno(next_seqno);

        let target_slot = ((self.current_index + SUPERBLOCK_SLOT_COUNT - 1) % SUPERBLOCK_SLOT_COUNT) + SUPERBLOCK_SLOT_START;

        if let Err(e) = cmds.write_block_spare(target_slot, self.superblock.block_bytes(), self.superblock.spare_bytes()) {
            warn!("update_fs failed writing slot {target_slot:04x}: {e}; dumping current_fs.bin");
            if let Err(dump_err) = std::fs::write("current_fs.bin", self.superblock.block_bytes()) {
                warn!("failed to write current_fs.bin: {dump_err}");
            }
            return Err(e.into());
        }

        if let Err(e) = cmds.init_fs() {
            warn!("init_fs after update_fs failed, device will resynchronize on reset: {e}");
        }

        self.current_index = target_slot - SUPERBLOCK_SLOT_START;
        Ok(())
    }

    /// Allocate `count` free blocks above the SKSA boundary, linking them
    /// into a chain terminated by `FatCell::End`.
    fn allocate_chain(&mut self, count: usize) -> Result<Vec<u16>, FsError> {
        let mut blocks = Vec::with_capacity(count);
        let mut cursor = SKSA_END;
        for _ in 0..count {
            let free = self.next_free_block(cursor).ok_or(FsError::NoFreeBlock)?;
            blocks.push(free);
            cursor = free + 1;
        }
        for i in 0..blocks.len() {
            let cell = if i + 1 < blocks.len() {
                FatCell::Next(blocks[i + 1])
            } else {
                FatCell::End
            };
            self.superblock.set_fat_cell(blocks[i], cell);
        }
        Ok(blocks)
    }

    /// Write `data` to the device as `target_name`: validate against
    /// duplicates and free space, stage as `temp.tmp`, upload block by
    /// block, verify by checksum, then rename into place.
    ///
    /// `update_fs` is always invoked afterward if any in-memory mutation
    /// occurred (a replaced file's deletion, or staging), regardless of
    /// whether the write itself succeeded, so allocation changes are
    /// never left unpersisted.
    pub fn write_file(&mut self, cmds: &mut Commands, target_name: &Filename, data: &[u8]) -> Result<(), FsError> {
        let mut mutated = false;
        let result = self.write_file_inner(cmds, target_name, data, &mut mutated);
        if mutated {
            match self.update_fs(cmds) {
                Ok(()) => result,
                Err(update_err) => result.and(Err(update_err)),
            }
        } else {
            result
        }
    }

    fn write_file_inner(
        &mut self,
        cmds: &mut Commands,
        target_name: &Filename,
        data: &[u8],
        mutated: &mut bool,
    ) -> Result<(), FsError> {
        let size = data.len() as u64;
        let num_blocks = size.div_ceil(BLOCK_SIZE as u64) as usize;
        if num_blocks > FILE_DATA_BLOCK_COUNT as usize {
            return Err(FsError::FileTooLarge {
                blocks: num_blocks,
                available: FILE_DATA_BLOCK_COUNT as usize,
            });
        }
        let checksum = checksum_of(data);
        let padded_size = (num_blocks * BLOCK_SIZE) as u32;

        if cmds.file_chksum(&target_name.to_string(), checksum, padded_size)? {
            return Err(FsError::AlreadyPresent);
        }

        let existing = self.find_entry(target_name);
        let replaced_len = match existing {
            Some(idx) => {
                let start = self.superblock.entry(idx).start_block();
                self.chain(start)?.len()
            }
            None => 0,
        };

        let free_budget = self.free_block_count() + replaced_len;
        if num_blocks >= free_budget {
            return Err(FsError::NoSpace);
        }

        if existing.is_some() {
            self.delete(target_name)?;
            *mutated = true;
        }

        let slot = self.superblock.find_blank_entry().ok_or(FsError::NoDirectorySlot)?;
        let blocks = self.allocate_chain(num_blocks)?;
        let start_block = blocks.first().copied().unwrap_or(NO_START_BLOCK);
        let temp_name = Filename::parse("temp.tmp").expect("valid literal filename");
        self.superblock.write_entry(slot, &temp_name, start_block, padded_size);
        *mutated = true;

        let spare_all_ff = [0xFFu8; SPARE_SIZE];
        for (i, &block) in blocks.iter().enumerate() {
            let offset = i * BLOCK_SIZE;
            let mut buf = vec![0u8; BLOCK_SIZE];
            if offset < data.len() {
                let end = (offset + BLOCK_SIZE).min(data.len());
                buf[..end - offset].copy_from_slice(&data[offset..end]);
            }
            cmds.write_block_spare(block, &buf, &spare_all_ff)?;
        }

        if !cmds.file_chksum("temp.tmp", checksum, padded_size)? {
            return Err(FsError::VerifyFailed);
        }

        self.superblock.write_entry(slot, target_name, start_block, padded_size);
        Ok(())
    }
}

/// Unsigned wraparound sum of every byte, matching the device's own
/// checksum algorithm.
fn checksum_of(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aulon_transport::MockTransport;
    use aulon_types::constants::{BLOCK_CHUNK_SIZE, RECEIVE_LENGTH_PREFIX, SEQNO_OFFSET};

    fn blank_superblock(seqno: u32) -> Superblock {
        let mut sb = Superblock::zeroed();
        sb.set_seqno(seqno);
        sb
    }

    /// Script one `read_block_spare` exchange: ready, an 8-byte success
    /// status, four chunked block replies, and a 16-byte spare reply.
    /// The block's only non-zero content is its sequence-number field.
    fn push_block_spare_reply(t: &mut MockTransport, seqno: u32) {
        t.push_ready();
        t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x08]);
        t.push_stream(&aulon_framing::encode_piecemeal(&[0u8; 8]));

        let mut block = vec![0u8; BLOCK_SIZE];
        block[SEQNO_OFFSET..SEQNO_OFFSET + 4].copy_from_slice(&seqno.to_be_bytes());
        for chunk in block.chunks(BLOCK_CHUNK_SIZE) {
            let len = chunk.len();
            t.push_packet(vec![RECEIVE_LENGTH_PREFIX, (len >> 16) as u8, (len >> 8) as u8, len as u8]);
            t.push_stream(&aulon_framing::encode_piecemeal(chunk));
        }

        let spare = [0xFFu8; SPARE_SIZE];
        t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, SPARE_SIZE as u8]);
        t.push_stream(&aulon_framing::encode_piecemeal(&spare));
    }

    #[test]
    fn load_selects_slot_with_greatest_seqno() {
        let mut t = MockTransport::with_packet_size(64);
        for slot in (SUPERBLOCK_SLOT_START..=0xFFFu16).rev() {
            let seqno = match slot {
                0xFF5 => 42,
                0xFF8 => 41,
                _ => 0,
            };
            push_block_spare_reply(&mut t, seqno);
        }
        let mut cmds = Commands::new(&mut t);
        let fs = FsImage::load(&mut cmds).unwrap();
        assert_eq!(fs.current_index(), 0xFF5 - SUPERBLOCK_SLOT_START);
        assert_eq!(fs.superblock().seqno(), 42);
    }

    #[test]
    fn free_block_count_counts_zero_cells() {
        let sb = blank_superblock(1);
        let fs = FsImage::from_superblock(sb, 0);
        assert_eq!(fs.free_block_count(), NUM_BLOCKS);
    }

    #[test]
    fn chain_walks_to_terminal_cell() {
        let mut sb = blank_superblock(1);
        sb.set_fat_cell(0x50, FatCell::Next(0x51));
        sb.set_fat_cell(0x51, FatCell::Next(0x52));
        sb.set_fat_cell(0x52, FatCell::End);
        let fs = FsImage::from_superblock(sb, 0);
        assert_eq!(fs.chain(0x50).unwrap(), vec![0x50, 0x51, 0x52]);
    }

    #[test]
    fn chain_rejects_free_cell_mid_walk() {
        let mut sb = blank_superblock(1);
        sb.set_fat_cell(0x50, FatCell::Next(0x51));
        let fs = FsImage::from_superblock(sb, 0);
        assert!(matches!(fs.chain(0x50), Err(FsError::InvalidChainCell(0x51))));
    }

    #[test]
    fn delete_frees_chain_and_clears_entry() {
        let mut sb = blank_superblock(1);
        sb.set_fat_cell(0x50, FatCell::Next(0x51));
        sb.set_fat_cell(0x51, FatCell::End);
        let name = Filename::parse("foo.bin").unwrap();
        sb.write_entry(0, &name, 0x50, 2 * BLOCK_SIZE as u32);
        let mut fs = FsImage::from_superblock(sb, 0);

        assert!(fs.delete(&name).unwrap());
        assert!(fs.find_entry(&name).is_none());
        assert_eq!(fs.superblock.fat_cell(0x50), FatCell::Free);
        assert_eq!(fs.superblock.fat_cell(0x51), FatCell::Free);
    }

    #[test]
    fn delete_and_update_skips_persist_when_nothing_deleted() {
        let sb = blank_superblock(1);
        let mut fs = FsImage::from_superblock(sb, 0);
        let mut t = MockTransport::new();
        let mut cmds = Commands::new(&mut t);
        let name = Filename::parse("missing.bin").unwrap();
        fs.delete_and_update(&mut cmds, &name).unwrap();
        assert!(t.sent.is_empty());
    }

    #[test]
    fn update_fs_rotates_to_expected_slot_when_index_zero() {
        let sb = blank_superblock(1);
        let mut fs = FsImage::from_superblock(sb, 0);
        let mut t = MockTransport::with_packet_size(64);

        // write_block_spare needs a ready before the command, another
        // before the block body, and a third before the spare body;
        // init_fs needs only the first.
        let ready_counts = [3, 1];
        for readies in ready_counts {
            for _ in 0..readies {
                t.push_ready();
            }
            t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x08]);
            t.push_stream(&aulon_framing::encode_piecemeal(&[0u8; 8]));
        }
        let mut cmds = Commands::new(&mut t);
        fs.update_fs(&mut cmds).unwrap();
        assert_eq!(fs.current_index(), 0xFFF - SUPERBLOCK_SLOT_START);
    }

    #[test]
    fn find_blank_entry_finds_all_zero_window() {
        let sb = blank_superblock(1);
        assert_eq!(sb.find_blank_entry(), Some(0));
    }

    #[test]
    fn seqno_field_roundtrips() {
        let mut sb = Superblock::zeroed();
        sb.set_seqno(42);
        assert_eq!(sb.seqno(), 42);
        assert_ne!(sb.block_bytes()[SEQNO_OFFSET], 0xFF);
    }

    /// Push `num_readies` ready signals followed by one 8-byte status
    /// reply, for scripting verbs that wait for ready more than once
    /// (block writes, `FILE_CHKSUM`) without spelling out each frame.
    fn push_readies_then_status(t: &mut MockTransport, num_readies: usize, status: i32) {
        for _ in 0..num_readies {
            t.push_ready();
        }
        t.push_packet(vec![RECEIVE_LENGTH_PREFIX, 0x00, 0x00, 0x08]);
        let mut body = [0u8; 8];
        body[4..8].copy_from_slice(&status.to_be_bytes());
        t.push_stream(&aulon_framing::encode_piecemeal(&body));
    }

    #[test]
    fn write_file_stages_uploads_verifies_and_renames() {
        let sb = blank_superblock(1);
        let mut fs = FsImage::from_superblock(sb, 0);
        let mut t = MockTransport::with_packet_size(64);

        // 1. duplicate check against the target name: no match.
        push_readies_then_status(&mut t, 3, -1);
        // 2. four block uploads (WRITE_BLOCK_AND_SPARE): ready before the
        //    command, the block body, and the spare body, then status.
        for _ in 0..4 {
            push_readies_then_status(&mut t, 3, 0);
        }
        // 3. verify against "temp.tmp": match.
        push_readies_then_status(&mut t, 3, 0);
        // 4. update_fs: write the superblock, then init_fs.
        push_readies_then_status(&mut t, 3, 0);
        push_readies_then_status(&mut t, 1, 0);

        let mut cmds = Commands::new(&mut t);
        let name = Filename::parse("game.bin").unwrap();
        let data = vec![0xABu8; 3 * BLOCK_SIZE + BLOCK_SIZE / 2]; // 3.5 blocks

        fs.write_file(&mut cmds, &name, &data).unwrap();

        let idx = fs.find_entry(&name).expect("renamed entry present");
        let entry = fs.superblock().entry(idx);
        assert_eq!(entry.start_block(), 0x0040);
        assert_eq!(entry.size(), 4 * BLOCK_SIZE as u32);
        assert_eq!(fs.chain(0x0040).unwrap(), vec![0x0040, 0x0041, 0x0042, 0x0043]);
        assert_eq!(fs.superblock().seqno(), 2);
    }
}
