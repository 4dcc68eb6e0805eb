// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

use aulon_commands::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no superblock slot could be read; device may not be initialized")]
    BootstrapFailed,
    #[error("file chain exceeded the maximum of {0} hops; filesystem is corrupt")]
    CorruptChain(usize),
    #[error("block {0:04x} encountered mid-chain is marked free or bad")]
    InvalidChainCell(u16),
    #[error("file not found")]
    NotFound,
    #[error("a file by this name already exists with identical contents")]
    AlreadyPresent,
    #[error("not enough free blocks to store this file")]
    NoSpace,
    #[error("no free directory slot available")]
    NoDirectorySlot,
    #[error("no free block available")]
    NoFreeBlock,
    #[error("file is too large for the device ({blocks} blocks needed, {available} available)")]
    FileTooLarge { blocks: usize, available: usize },
    #[error("upload completed but the device's checksum did not match")]
    VerifyFailed,
}
