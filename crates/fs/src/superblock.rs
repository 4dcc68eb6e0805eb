// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The 16 KiB on-NAND superblock: block allocation table, directory, and
//! sequence number, plus its 16-byte spare area.

use aulon_types::constants::{
    BLOCK_SIZE, FILE_ENTRIES_START, FILE_ENTRY_SIZE, NUM_FILE_ENTRIES, SEQNO_OFFSET, SPARE_SIZE,
};
use aulon_types::{FatCell, Filename};
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The fixed 20-byte on-wire layout of one directory entry.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
#[repr(C, packed)]
pub struct DirEntryRaw {
    pub stem: [u8; 8],
    pub ext: [u8; 3],
    pub valid: u8,
    pub start_block: U16<BigEndian>,
    pub reserved: U16<BigEndian>,
    pub size: U32<BigEndian>,
}

const _: () = assert!(core::mem::size_of::<DirEntryRaw>() == FILE_ENTRY_SIZE);

impl DirEntryRaw {
    /// An entry is valid if its stem is non-empty, its flag byte is
    /// nonzero, and its start block is not the "absent" sentinel.
    pub fn is_valid(&self) -> bool {
        self.stem[0] != 0 && self.valid != 0 && self.start_block.get() != 0xFFFF
    }

    pub fn is_blank(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn filename(&self) -> Filename {
        Filename::from_entry_fields(&self.stem, &self.ext)
    }

    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn start_block(&self) -> u16 {
        self.start_block.get()
    }
}

/// Owned, mutable 16 KiB superblock plus its spare area.
#[derive(Clone)]
pub struct Superblock {
    block: Vec<u8>,
    spare: [u8; SPARE_SIZE],
}

impl Superblock {
    pub fn from_parts(block: Vec<u8>, spare: [u8; SPARE_SIZE]) -> Self {
        assert_eq!(block.len(), BLOCK_SIZE, "superblock must be exactly one NAND block");
        Superblock { block, spare }
    }

    pub fn zeroed() -> Self {
        Superblock {
            block: vec![0u8; BLOCK_SIZE],
            spare: [0xFFu8; SPARE_SIZE],
        }
    }

    pub fn block_bytes(&self) -> &[u8] {
        &self.block
    }

    pub fn spare_bytes(&self) -> &[u8; SPARE_SIZE] {
        &self.spare
    }

    pub fn seqno(&self) -> u32 {
        u32::from_be_bytes(self.block[SEQNO_OFFSET..SEQNO_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_seqno(&mut self, value: u32) {
        self.block[SEQNO_OFFSET..SEQNO_OFFSET + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn fat_cell(&self, block: u16) -> FatCell {
        let offset = block as usize * 2;
        let raw = u16::from_be_bytes([self.block[offset], self.block[offset + 1]]);
        FatCell::from_raw(raw)
    }

    pub fn set_fat_cell(&mut self, block: u16, cell: FatCell) {
        let offset = block as usize * 2;
        self.block[offset..offset + 2].copy_from_slice(&cell.to_raw().to_be_bytes());
    }

    fn entry_offset(index: usize) -> usize {
        FILE_ENTRIES_START + index * FILE_ENTRY_SIZE
    }

    pub fn entry(&self, index: usize) -> &DirEntryRaw {
        let offset = Self::entry_offset(index);
        DirEntryRaw::ref_from_bytes(&self.block[offset..offset + FILE_ENTRY_SIZE])
            .expect("directory entry slice is exactly sized")
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut DirEntryRaw {
        let offset = Self::entry_offset(index);
        DirEntryRaw::mut_from_bytes(&mut self.block[offset..offset + FILE_ENTRY_SIZE])
            .expect("directory entry slice is exactly sized")
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &DirEntryRaw)> {
        (0..NUM_FILE_ENTRIES).map(move |i| (i, self.entry(i)))
    }

    pub fn write_entry(&mut self, index: usize, filename: &Filename, start_block: u16, size: u32) {
        let entry = self.entry_mut(index);
        entry.stem = filename.to_stem_field();
        entry.ext = filename.to_ext_field();
        entry.valid = 1;
        entry.start_block = U16::new(start_block);
        entry.reserved = U16::new(0);
        entry.size = U32::new(size);
    }

    pub fn clear_entry(&mut self, index: usize) {
        let offset = Self::entry_offset(index);
        self.block[offset..offset + FILE_ENTRY_SIZE].fill(0);
    }

    pub fn find_blank_entry(&self) -> Option<usize> {
        (0..NUM_FILE_ENTRIES).find(|&i| self.entry(i).is_blank())
    }

    pub fn find_entry(&self, name: &Filename) -> Option<usize> {
        self.entries()
            .find(|(_, e)| e.is_valid() && &e.filename() == name)
            .map(|(i, _)| i)
    }
}
