/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom},
};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::stream::{FromReader, ReadFixedSizeExt};

pub const MAGIC: u32 = 0xb001_b001;
pub const VERSION: u32 = 0;

/// The signature field has a fixed size, which also fixes the signing key to
/// 2048-bit RSA.
pub const SIGNATURE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid verity metadata magic: {0:#010x}")]
    MetadataNotFound(u32),
    #[error("Unsupported verity metadata version: {0}")]
    UnsupportedVersion(u32),
    #[error("Verity table truncated: expected {expected} bytes, but only {available} available")]
    TruncatedMetadata { expected: u32, available: usize },
    #[error("I/O error")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// The metadata block appended after the filesystem payload. The table is the
/// dm-verity mapping table describing the hash tree. Its contents are opaque
/// to this parser beyond being the signed payload.
#[derive(Clone, Eq, PartialEq)]
pub struct Metadata {
    pub signature: [u8; SIGNATURE_SIZE],
    pub table: Vec<u8>,
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("signature", &hex::encode(self.signature))
            .field("table", &format_args!("<{} bytes>", self.table.len()))
            .finish()
    }
}

impl Metadata {
    /// Read the metadata block at `offset`, which is expected to be the value
    /// computed by [`crate::format::ext4::payload_size`]. Only structural
    /// well-formedness is checked; the table contents are not validated.
    pub fn read_at(mut reader: impl Read + Seek, offset: u64) -> Result<Self> {
        reader.seek(SeekFrom::Start(offset))?;
        Self::from_reader(reader)
    }
}

impl<R: Read> FromReader<R> for Metadata {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(Error::MetadataNotFound(magic));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let signature = reader.read_array_exact::<SIGNATURE_SIZE>()?;

        let table_size = reader.read_u32::<LittleEndian>()?;

        let mut table = Vec::new();
        reader
            .take(u64::from(table_size))
            .read_to_end(&mut table)?;
        if table.len() != table_size as usize {
            return Err(Error::TruncatedMetadata {
                expected: table_size,
                available: table.len(),
            });
        }

        Ok(Self { signature, table })
    }
}
