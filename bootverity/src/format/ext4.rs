/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

/// Offset of the superblock from the start of the filesystem image.
pub const SUPERBLOCK_OFFSET: u64 = 0x400;

pub const MAGIC: u16 = 0xef53;

// Field offsets relative to the start of the superblock.
const BLOCKS_COUNT_LO_OFFSET: u64 = 0x04;
const LOG_BLOCK_SIZE_OFFSET: u64 = 0x18;
const MAGIC_OFFSET: u64 = 0x38;
const BLOCKS_COUNT_HI_OFFSET: u64 = 0x150;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid ext4 superblock magic: {0:#06x}")]
    CorruptImage(u16),
    #[error("{0:?} field is out of bounds")]
    FieldOutOfBounds(&'static str),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Compute the size of the filesystem payload in bytes from the superblock's
/// geometry fields. For a verity-enabled image, this is exactly the offset at
/// which the verity metadata block begins.
///
/// No superblock field is trusted before the magic check passes. All fields
/// are decoded as little-endian regardless of host byte order.
pub fn payload_size(mut reader: impl Read + Seek) -> Result<u64> {
    reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET + MAGIC_OFFSET))?;
    let magic = reader.read_u16::<LittleEndian>()?;

    if magic != MAGIC {
        return Err(Error::CorruptImage(magic));
    }

    reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET + LOG_BLOCK_SIZE_OFFSET))?;
    let log_block_size = reader.read_u32::<LittleEndian>()?;

    reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET + BLOCKS_COUNT_LO_OFFSET))?;
    let blocks_count_lo = reader.read_u32::<LittleEndian>()?;

    reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET + BLOCKS_COUNT_HI_OFFSET))?;
    let blocks_count_hi = reader.read_u32::<LittleEndian>()?;

    // The shift would lose bits once the block size exceeds 2^63.
    if log_block_size >= 54 {
        return Err(Error::FieldOutOfBounds("log_block_size"));
    }

    let block_size = 1024u64 << log_block_size;
    let blocks_count = (u64::from(blocks_count_hi) << 32) | u64::from(blocks_count_lo);

    block_size
        .checked_mul(blocks_count)
        .ok_or(Error::FieldOutOfBounds("blocks_count"))
}
