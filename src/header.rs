//! Archive header — format anchor at offset 0.
//!
//! # On-disk layout (12 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic           = 0x00003169  (LE u32)
//!    4      4   bytes_per_block allocation unit, OS page size at create time
//!    8      4   first_entry     byte offset of the first record (LE u32)
//! ```
//!
//! `first_entry` is `align_up(12, bytes_per_block)`; the gap between the
//! header and the first record is padding written once at create time.
//! Every record start is block-aligned, so the whole archive can be walked
//! from `first_entry` using each record's `num_blocks` as the stride.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// On-disk magic for every archive.  LE u32; first bytes on disk are
/// `69 31 00 00`.
pub const ARCHIVE_MAGIC: u32 = 0x0000_3169;

/// Serialised header size.
pub const HEADER_SIZE: usize = 12;

/// Block size used when the OS page size cannot be determined.
pub const FALLBACK_BLOCK_SIZE: u32 = 4096;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("invalid archive magic {found:#010x} (expected {ARCHIVE_MAGIC:#010x})")]
    BadMagic { found: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub magic:           u32,
    pub bytes_per_block: u32,
    pub first_entry:     u32,
}

impl ArchiveHeader {
    /// Build a fresh header for `Create`: page-size blocks, first record at
    /// the first block boundary past the header.
    pub fn new() -> Self {
        let bytes_per_block = crate::file::page_size();
        Self {
            magic: ARCHIVE_MAGIC,
            bytes_per_block,
            first_entry: align_up(HEADER_SIZE as u64, bytes_per_block as u64) as u32,
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u32::<LittleEndian>(self.bytes_per_block)?;
        w.write_u32::<LittleEndian>(self.first_entry)
    }

    /// Read and validate the magic.  The block size and first-entry offset
    /// are trusted as stored; `Load` re-checks them implicitly by walking
    /// the record chain to EOF.
    pub fn read<R: Read>(mut r: R) -> Result<Self, HeaderError> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != ARCHIVE_MAGIC {
            return Err(HeaderError::BadMagic { found: magic });
        }
        let bytes_per_block = r.read_u32::<LittleEndian>()?;
        let first_entry     = r.read_u32::<LittleEndian>()?;
        Ok(Self { magic, bytes_per_block, first_entry })
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `x` up to the next multiple of `align`.  Exact multiples stay put,
/// so a payload filling its blocks exactly reserves no extra block.
#[inline]
pub fn align_up(x: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    x.div_ceil(align) * align
}
