//! File-entry record — fixed 551-byte header preceding every payload — and
//! the encode/decode pipeline that fills it.
//!
//! # On-disk layout (551 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   index            name fingerprint; 0 = free entry
//!    4      4   hash             xxh32 of the plaintext, seed 0
//!    8      4   version          caller-assigned
//!   12      1   flags            0x1 = LZ4, 0x2 = AES-256-CBC
//!   13      4   rawsize          plaintext bytes
//!   17      4   compressedsize   after the LZ4 stage (= rawsize when stored)
//!   21      4   cryptedsize      after the AES stage (final payload bytes)
//!   25    510   filename         255 UTF-16-LE units, zero-filled; diagnostic
//!  535      4   final_size       payload bytes immediately after this record
//!  539      4   num_blocks       reserved space in bytes_per_block units
//!  543      8   offset           absolute file offset of the payload
//! ```
//!
//! The record sits at `offset - 551`; the payload starts at `offset` exactly.
//! `final_size`, `num_blocks` and `offset` are persistence bookkeeping; the
//! semantic fields are zeroed when an entry is freed, the bookkeeping fields
//! are preserved so the slot can be re-allocated.
//!
//! # Pipeline
//!
//! Write direction: fingerprint → optional LZ4 → optional AES-256-CBC.
//! Read direction is the exact inverse, ending in a mandatory comparison of
//! the plaintext hash against the stored one.  The hash check is the last
//! line of defence; there is no opt-out.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::codec::{self, CodecError, Compressed};
use crate::crypto::{self, CryptoError, KEY_LENGTH};
use crate::index::content_hash;

/// Entry is stored verbatim.
pub const FLAG_RAW_DATA: u8 = 0;
/// Payload passed through the LZ4 stage.
pub const FLAG_COMPRESSED_LZ4: u8 = 0x1;
/// Payload passed through the AES-256-CBC stage.
pub const FLAG_CRYPTED_AES256: u8 = 0x2;
/// First invalid flags value; job types must be below this.
pub const FLAG_MAX: u8 = 4;

/// Width of the diagnostic filename buffer in UTF-16 code units.
pub const FILENAME_UNITS: usize = 255;

/// Serialised record size.
pub const RECORD_SIZE: usize = 551;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("plaintext hash mismatch: stored {expected:#010x}, computed {got:#010x}")]
    Integrity { expected: u32, got: u32 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// ── Record ───────────────────────────────────────────────────────────────────

/// In-memory form of the on-disk record.  `filename` is decoded from the
/// fixed buffer and may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub index:           u32,
    pub hash:            u32,
    pub version:         u32,
    pub flags:           u8,
    pub rawsize:         u32,
    pub compressedsize:  u32,
    pub cryptedsize:     u32,
    pub filename:        String,
    pub final_size:      u32,
    pub num_blocks:      u32,
    pub offset:          u64,
}

impl FileRecord {
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.index)?;
        w.write_u32::<LittleEndian>(self.hash)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u8(self.flags)?;
        w.write_u32::<LittleEndian>(self.rawsize)?;
        w.write_u32::<LittleEndian>(self.compressedsize)?;
        w.write_u32::<LittleEndian>(self.cryptedsize)?;

        // Fixed-width name buffer: truncate to 254 units, keep a NUL.
        let mut units = [0u16; FILENAME_UNITS];
        for (slot, u) in units
            .iter_mut()
            .zip(self.filename.encode_utf16().take(FILENAME_UNITS - 1))
        {
            *slot = u;
        }
        for u in units {
            w.write_u16::<LittleEndian>(u)?;
        }

        w.write_u32::<LittleEndian>(self.final_size)?;
        w.write_u32::<LittleEndian>(self.num_blocks)?;
        w.write_u64::<LittleEndian>(self.offset)
    }

    pub fn read_from<R: Read>(mut r: R) -> io::Result<Self> {
        let index          = r.read_u32::<LittleEndian>()?;
        let hash           = r.read_u32::<LittleEndian>()?;
        let version        = r.read_u32::<LittleEndian>()?;
        let flags          = r.read_u8()?;
        let rawsize        = r.read_u32::<LittleEndian>()?;
        let compressedsize = r.read_u32::<LittleEndian>()?;
        let cryptedsize    = r.read_u32::<LittleEndian>()?;

        let mut units = [0u16; FILENAME_UNITS];
        for slot in units.iter_mut() {
            *slot = r.read_u16::<LittleEndian>()?;
        }
        let len = units.iter().position(|&u| u == 0).unwrap_or(FILENAME_UNITS);
        let filename = String::from_utf16_lossy(&units[..len]);

        let final_size = r.read_u32::<LittleEndian>()?;
        let num_blocks = r.read_u32::<LittleEndian>()?;
        let offset     = r.read_u64::<LittleEndian>()?;

        Ok(Self {
            index,
            hash,
            version,
            flags,
            rawsize,
            compressedsize,
            cryptedsize,
            filename,
            final_size,
            num_blocks,
            offset,
        })
    }

    /// Serialise into a fresh `RECORD_SIZE` buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        self.write_to(&mut buf).expect("Vec write is infallible");
        buf
    }

    /// Free-entry form: all semantic fields zeroed, slot bookkeeping
    /// (`offset`, `num_blocks`) preserved for reuse.
    pub fn cleared(&self) -> Self {
        Self {
            num_blocks: self.num_blocks,
            offset: self.offset,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.index == 0
    }
}

// ── Encode / decode pipeline ─────────────────────────────────────────────────

/// Result of the write-direction pipeline: the final payload plus every
/// size/flag/hash field the record needs.
#[derive(Debug)]
pub struct EncodedEntry {
    pub flags:          u8,
    pub hash:           u32,
    pub rawsize:        u32,
    pub compressedsize: u32,
    pub cryptedsize:    u32,
    pub payload:        Vec<u8>,
}

/// Run the codec pipeline over `data`.
///
/// The compressed flag is cleared when LZ4 is unprofitable; the returned
/// `flags` therefore describes the payload actually produced, which is what
/// gets persisted.
pub fn encode_entry(
    data: &[u8],
    mut flags: u8,
    key: &[u8; KEY_LENGTH],
) -> Result<EncodedEntry, EntryError> {
    let hash = content_hash(data);

    let compressed = if flags & FLAG_COMPRESSED_LZ4 != 0 {
        match codec::compress(data) {
            Compressed::Shrunk(out) => out,
            Compressed::Unprofitable => {
                flags &= !FLAG_COMPRESSED_LZ4;
                data.to_vec()
            }
        }
    } else {
        data.to_vec()
    };
    let compressedsize = compressed.len() as u32;

    let payload = if flags & FLAG_CRYPTED_AES256 != 0 {
        crypto::encrypt(&compressed, key)?
    } else {
        compressed
    };

    Ok(EncodedEntry {
        flags,
        hash,
        rawsize: data.len() as u32,
        compressedsize,
        cryptedsize: payload.len() as u32,
        payload,
    })
}

/// Invert the pipeline for one stored payload and verify the plaintext hash
/// against the record.
pub fn decode_entry(
    payload: &[u8],
    record: &FileRecord,
    key: &[u8; KEY_LENGTH],
) -> Result<Vec<u8>, EntryError> {
    let decrypted = if record.flags & FLAG_CRYPTED_AES256 != 0 {
        crypto::decrypt(payload, key)?
    } else {
        payload.to_vec()
    };

    let plaintext = if record.flags & FLAG_COMPRESSED_LZ4 != 0 {
        let compressed = decrypted
            .get(..record.compressedsize as usize)
            .ok_or(CodecError::Decompress {
                expected: record.compressedsize as usize,
                got: decrypted.len(),
            })?;
        codec::decompress(compressed, record.rawsize as usize)?
    } else {
        decrypted
    };

    let got = content_hash(&plaintext);
    if got != record.hash {
        return Err(EntryError::Integrity { expected: record.hash, got });
    }

    Ok(plaintext)
}
