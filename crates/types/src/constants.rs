// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed NAND/FS geometry and wire framing constants. None of these are
//! negotiated; the console's layout is the same across every unit.

/// Size in bytes of one NAND block's user data.
pub const BLOCK_SIZE: usize = 0x4000;
/// Size of one chunk used when transferring a block in four pieces.
pub const BLOCK_CHUNK_SIZE: usize = 0x1000;
/// Number of chunks that make up a full block.
pub const CHUNKS_PER_BLOCK: usize = BLOCK_SIZE / BLOCK_CHUNK_SIZE;
/// Size in bytes of a block's out-of-band spare area.
pub const SPARE_SIZE: usize = 0x10;
/// Total number of blocks on the NAND.
pub const NUM_BLOCKS: usize = 0x1000;

pub const SHA1_HASH_LENGTH: usize = 20;
pub const ECC_SIG_LENGTH: usize = 64;

/// First block of the secure kernel / system area. Blocks below this are
/// SKSA; writing them is the "unsafe" regime.
pub const SKSA_END: u16 = 0x040;
/// First block of the rotating superblock region.
pub const SUPERBLOCK_SLOT_START: u16 = 0xFF0;
/// Number of rotating superblock slots.
pub const SUPERBLOCK_SLOT_COUNT: u16 = 16;
/// Largest block index usable for file data (inclusive); one past this is
/// the first superblock slot.
pub const FILE_DATA_END: u16 = SUPERBLOCK_SLOT_START - 1;
/// Number of blocks available for file data allocation.
pub const FILE_DATA_BLOCK_COUNT: u16 = SUPERBLOCK_SLOT_START - SKSA_END;

/// Byte offset within a superblock of the start of the directory area.
pub const FILE_ENTRIES_START: usize = 0x2000;
/// Size in bytes of one directory entry.
pub const FILE_ENTRY_SIZE: usize = 20;
/// Number of directory entry slots.
pub const NUM_FILE_ENTRIES: usize = 409;
/// Byte offset within a superblock of the big-endian 32-bit sequence number.
pub const SEQNO_OFFSET: usize = 0x3FF8;

/// Leading byte of a host-to-device piecemeal tag group, offset by the
/// group's payload length (1..=3).
pub const PIECEMEAL_SEND_TAG_BASE: u8 = 0x40;
/// Leading byte of a device-to-host piecemeal tag group, offset by the
/// group's payload length (1..=3).
pub const PIECEMEAL_RECV_TAG_BASE: u8 = 0x1C;
/// Leading byte of a chunked-send frame.
pub const SEND_CHUNK_SIGNAL: u8 = 0x63;
/// Maximum payload length of one chunked-send frame.
pub const SEND_CHUNK_MAX_LEN: usize = 0xFE;
/// Leading byte of a length-prefixed reply header.
pub const RECEIVE_LENGTH_PREFIX: u8 = 0x1B;
/// The four bytes the device sends to indicate it is ready for a command.
pub const READY_SIGNAL: [u8; 4] = [0x15, 0x00, 0x00, 0x00];
/// The single byte the host sends to acknowledge a received reply.
pub const ACK_BYTE: u8 = 0x44;

/// Maximum number of chain hops before a file's block list is considered
/// corrupt (`NUM_BLOCKS - 16`, one more than any legitimate chain could need).
pub const MAX_CHAIN_HOPS: usize = NUM_BLOCKS - SUPERBLOCK_SLOT_COUNT as usize;

/// Maximum number of attempts for a block read or write.
pub const BLOCK_IO_RETRIES: u32 = 5;

/// Maximum filename stem length, in ASCII characters.
pub const MAX_STEM_LEN: usize = 8;
/// Maximum filename extension length, in ASCII characters.
pub const MAX_EXT_LEN: usize = 3;
