//! # vfarc — single-file virtual file system archive
//!
//! Format guarantees (frozen):
//! - All numeric fields are little-endian; the header magic is `0x00003169`
//! - Records are block-aligned: the allocation unit is `bytes_per_block`
//!   (the OS page size at create time), and walking records from
//!   `first_entry` by each record's `num_blocks` stride reaches exactly EOF
//! - The payload sits at `offset`; its 551-byte record sits immediately
//!   before it at `offset - 551`
//! - `index == 0` marks a free slot; freed space is re-used best-fit before
//!   the file ever grows, and the file never shrinks
//! - Entries are independently LZ4-compressed and/or AES-256-CBC-encrypted;
//!   a compressed flag is only stored when LZ4 actually shrank the payload
//! - Every entry carries the xxh32 (seed 0) of its plaintext; the hash is
//!   verified on every read with no opt-out
//! - The name index is xxh32 (seed 0) over the UTF-16-LE units of the
//!   lowercased, slash-normalised logical path

pub mod archive;
pub mod builder;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod entry;
pub mod file;
pub mod header;
pub mod index;
pub mod log;
pub mod pack;
pub mod property;
pub mod verify;

// Flat re-exports for the most common types.
pub use archive::{Archive, ArchiveError};
pub use builder::{build_archive, run_jobs, BuildError, BuildJob, PatchRule};
pub use config::{load_jobs, ConfigError, LITE_CRYPT_KEY};
pub use crypto::{key_from_ascii, ARCHIVE_IV, KEY_LENGTH};
pub use entry::{
    FileRecord, FLAG_COMPRESSED_LZ4, FLAG_CRYPTED_AES256, FLAG_MAX, FLAG_RAW_DATA, RECORD_SIZE,
};
pub use file::{page_size, FileMode, VfsFile};
pub use header::{ArchiveHeader, ARCHIVE_MAGIC, HEADER_SIZE};
pub use index::{content_hash, name_index};
pub use pack::{absolute_path, wildcard_match, PackError, VfsPack};
pub use verify::unpack_archive;
