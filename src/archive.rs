//! Archive engine — header, entry table, block allocator, live/free lists.
//!
//! One archive is one disk file:
//!
//! ```text
//! [ header | pad to first_entry ]
//! [ record | payload | pad to num_blocks * bytes_per_block ]
//! [ record | payload | ... ]
//! ```
//!
//! Records are block-aligned, so `Load` walks the file from `first_entry`
//! using each record's `num_blocks` as the stride.  A record with index 0 is
//! a free slot; its space is handed back out by a best-fit scan before the
//! file is ever extended.  Deleting never erases payload bytes and the file
//! never shrinks.
//!
//! All operations serialise on one internal lock.  Handles are meant to be
//! shared as `Arc<Archive>`; the engine itself is immutable after `create`
//! or `load` apart from the guarded state.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::KEY_LENGTH;
use crate::entry::{decode_entry, encode_entry, EntryError, FileRecord, RECORD_SIZE};
use crate::file::{FileError, VfsFile};
use crate::header::{align_up, ArchiveHeader, HeaderError, HEADER_SIZE};
use crate::index::{content_hash, name_index};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid archive magic {found:#010x}")]
    BadMagic { found: u32 },
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: u64, got: u64 },
    #[error("short write: expected {expected} bytes, got {got}")]
    ShortWrite { expected: u64, got: u64 },
    #[error("no entry for index {0:#010x}")]
    NotFound(u32),
    #[error("archive is not writeable")]
    NotWriteable,
    #[error("archive is not readable")]
    NotReadable,
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeaderError> for ArchiveError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::BadMagic { found } => ArchiveError::BadMagic { found },
            HeaderError::Io(e) => ArchiveError::Io(e),
        }
    }
}

#[derive(Default)]
struct ArchiveState {
    file:   Option<VfsFile>,
    key:    [u8; KEY_LENGTH],
    header: Option<ArchiveHeader>,
    /// Live set, keyed by name index.
    files:  HashMap<u32, FileRecord>,
    /// Free slots in the order they were released.
    free:   Vec<FileRecord>,
}

pub struct Archive {
    state: Mutex<ArchiveState>,
}

impl Archive {
    pub fn new() -> Self {
        Self { state: Mutex::new(ArchiveState::default()) }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Parse an existing archive from `file` and take ownership of it.
    /// Any previously loaded state is discarded first.
    pub fn load(&self, mut file: VfsFile, key: &[u8; KEY_LENGTH]) -> Result<(), ArchiveError> {
        let mut st = self.state.lock().unwrap();
        Self::unload_state(&mut st);

        if !file.is_readable() {
            return Err(ArchiveError::NotReadable);
        }
        let (header, files, free) = Self::scan(&mut file)?;

        info!(
            archive = %file.name().display(),
            files = files.len(),
            free = free.len(),
            "archive loaded"
        );
        *st = ArchiveState { file: Some(file), key: *key, header: Some(header), files, free };
        Ok(())
    }

    /// Load `file` if it already holds an archive, otherwise initialise a
    /// fresh one: header at offset 0, padding up to the first block boundary.
    pub fn create(&self, mut file: VfsFile, key: &[u8; KEY_LENGTH]) -> Result<(), ArchiveError> {
        let mut st = self.state.lock().unwrap();
        Self::unload_state(&mut st);

        if !file.is_writeable() {
            return Err(ArchiveError::NotWriteable);
        }

        match Self::scan(&mut file) {
            Ok((header, files, free)) => {
                info!(archive = %file.name().display(), files = files.len(), "existing archive opened");
                *st = ArchiveState { file: Some(file), key: *key, header: Some(header), files, free };
            }
            Err(_) => {
                let header = ArchiveHeader::new();
                let mut image = Vec::with_capacity(header.first_entry as usize);
                header.write(&mut image)?;
                image.resize(header.first_entry as usize, 0);

                file.set_position(0, false)?;
                file.write(&image)?;

                info!(
                    archive = %file.name().display(),
                    bytes_per_block = header.bytes_per_block,
                    "archive created"
                );
                *st = ArchiveState {
                    file: Some(file),
                    key: *key,
                    header: Some(header),
                    files: HashMap::new(),
                    free: Vec::new(),
                };
            }
        }
        Ok(())
    }

    /// Drop the backing file, zero the key, clear both entry lists.  The
    /// file on disk is left as-is.
    pub fn unload(&self) {
        let mut st = self.state.lock().unwrap();
        Self::unload_state(&mut st);
    }

    fn unload_state(st: &mut ArchiveState) {
        st.key = [0u8; KEY_LENGTH];
        st.files.clear();
        st.free.clear();
        st.header = None;
        st.file = None;
    }

    /// Walk the record chain from `first_entry` to EOF.
    fn scan(
        file: &mut VfsFile,
    ) -> Result<(ArchiveHeader, HashMap<u32, FileRecord>, Vec<FileRecord>), ArchiveError> {
        file.set_position(0, false)?;
        let mut hdr_buf = [0u8; HEADER_SIZE];
        let n = file.read(&mut hdr_buf)?;
        if n != HEADER_SIZE {
            return Err(ArchiveError::ShortRead { expected: HEADER_SIZE as u64, got: n as u64 });
        }
        let header = ArchiveHeader::read(&hdr_buf[..])?;

        let mut files = HashMap::new();
        let mut free = Vec::new();
        let size = file.size();
        let mut pos = u64::from(header.first_entry);
        file.set_position(pos as i64, false)?;

        let mut rec_buf = vec![0u8; RECORD_SIZE];
        while pos < size {
            let n = file.read(&mut rec_buf)?;
            if n != RECORD_SIZE {
                return Err(ArchiveError::ShortRead { expected: RECORD_SIZE as u64, got: n as u64 });
            }
            let record = FileRecord::read_from(&rec_buf[..])?;

            let start = record.offset.checked_sub(RECORD_SIZE as u64);
            let next = start
                .map(|s| s + u64::from(record.num_blocks) * u64::from(header.bytes_per_block))
                .filter(|&next| next > pos)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "record stride does not advance")
                })?;

            if record.is_free() {
                free.push(record);
            } else {
                files.insert(record.index, record);
            }
            file.set_position(next as i64, false)?;
            pos = next;
        }

        Ok((header, files, free))
    }

    // ── Write path ───────────────────────────────────────────────────────────

    /// Insert or replace one logical file.
    ///
    /// Writing bytes whose hash matches the live entry for the same path is
    /// a no-op.  A replaced entry is freed first, so its slot is a candidate
    /// for the new payload.
    pub fn write(
        &self,
        path: &str,
        data: &[u8],
        flags: u8,
        version: u32,
    ) -> Result<(), ArchiveError> {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        if !st.file.as_ref().is_some_and(VfsFile::is_writeable) {
            return Err(ArchiveError::NotWriteable);
        }

        let index = name_index(path);
        let hash = content_hash(data);
        if let Some(existing) = st.files.get(&index) {
            if existing.hash == hash {
                debug!(path, index, "unchanged content, write skipped");
                return Ok(());
            }
        }

        let encoded = encode_entry(data, flags, &st.key)?;
        Self::delete_slot(st, index)?;
        let (offset, num_blocks) = Self::reserve(st, encoded.payload.len() as u64)?;

        let record = FileRecord {
            index,
            hash,
            version,
            flags: encoded.flags,
            rawsize: encoded.rawsize,
            compressedsize: encoded.compressedsize,
            cryptedsize: encoded.cryptedsize,
            filename: path.to_owned(),
            final_size: encoded.cryptedsize,
            num_blocks,
            offset,
        };
        Self::store(st, &record, &encoded.payload)?;

        debug!(
            path,
            index,
            rawsize = record.rawsize,
            final_size = record.final_size,
            flags = record.flags,
            version,
            "entry written"
        );
        st.files.insert(index, record);
        Ok(())
    }

    /// Remove the entry for `path`.  Returns `false` when the entry is
    /// absent or the archive is not writeable.
    pub fn delete(&self, path: &str) -> bool {
        self.delete_index(name_index(path))
    }

    /// Remove the entry for `index`; see [`Archive::delete`].
    pub fn delete_index(&self, index: u32) -> bool {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        if !st.file.as_ref().is_some_and(VfsFile::is_writeable) {
            return false;
        }
        match Self::delete_slot(st, index) {
            Ok(found) => found,
            Err(e) => {
                warn!(index, error = %e, "delete failed");
                false
            }
        }
    }

    /// Move a live entry onto the free list and zero its on-disk record,
    /// keeping `offset`/`num_blocks` so the slot stays allocatable.
    fn delete_slot(st: &mut ArchiveState, index: u32) -> Result<bool, ArchiveError> {
        let Some(record) = st.files.remove(&index) else {
            return Ok(false);
        };
        let freed = record.cleared();

        let file = st.file.as_mut().ok_or(ArchiveError::NotWriteable)?;
        file.set_position((freed.offset - RECORD_SIZE as u64) as i64, false)?;
        file.write(&freed.to_bytes())?;

        debug!(index, offset = freed.offset, blocks = freed.num_blocks, "entry freed");
        st.free.push(freed);
        Ok(true)
    }

    /// Best-fit allocator.  Reuses the smallest free slot whose block span
    /// holds `payload_len + RECORD_SIZE` (ties broken by release order),
    /// else extends the file by whole blocks at EOF.
    fn reserve(st: &mut ArchiveState, payload_len: u64) -> Result<(u64, u32), ArchiveError> {
        let header = st.header.ok_or(ArchiveError::NotWriteable)?;
        let bpb = u64::from(header.bytes_per_block);
        let need = payload_len + RECORD_SIZE as u64;

        let mut best: Option<usize> = None;
        for (i, slot) in st.free.iter().enumerate() {
            if u64::from(slot.num_blocks) * bpb >= need
                && best.map_or(true, |b| slot.num_blocks < st.free[b].num_blocks)
            {
                best = Some(i);
            }
        }
        if let Some(i) = best {
            let slot = st.free.remove(i);
            debug!(offset = slot.offset, blocks = slot.num_blocks, "free slot reused");
            return Ok((slot.offset, slot.num_blocks));
        }

        let file = st.file.as_mut().ok_or(ArchiveError::NotWriteable)?;
        let eof = file.size();
        let num_blocks = (align_up(need, bpb) / bpb) as u32;
        let offset = eof + RECORD_SIZE as u64;

        file.set_position(eof as i64, false)?;
        file.write(&vec![0u8; (u64::from(num_blocks) * bpb) as usize])?;
        Ok((offset, num_blocks))
    }

    fn store(st: &mut ArchiveState, record: &FileRecord, payload: &[u8]) -> Result<(), ArchiveError> {
        let file = st.file.as_mut().ok_or(ArchiveError::NotWriteable)?;
        file.set_position((record.offset - RECORD_SIZE as u64) as i64, false)?;
        file.write(&record.to_bytes())?;
        file.write(payload)?;
        Ok(())
    }

    // ── Read path ────────────────────────────────────────────────────────────

    /// Decode one entry into a `Memory`-mode handle named after the stored
    /// filename (or `fallback_name` when the record carries none).
    pub fn open_index(
        &self,
        index: u32,
        fallback_name: Option<&str>,
    ) -> Result<VfsFile, ArchiveError> {
        let st = self.state.lock().unwrap();
        let record = st.files.get(&index).ok_or(ArchiveError::NotFound(index))?;
        let backing = st
            .file
            .as_ref()
            .filter(|f| f.is_readable())
            .ok_or(ArchiveError::NotReadable)?;

        // Fresh read-only handle so the archive's own cursor is untouched.
        let mut input = VfsFile::open(backing.name())?;
        input.set_position(record.offset as i64, false)?;
        let mut payload = vec![0u8; record.final_size as usize];
        let n = input.read(&mut payload)?;
        if n != record.final_size as usize {
            return Err(ArchiveError::ShortRead {
                expected: u64::from(record.final_size),
                got: n as u64,
            });
        }

        let plaintext = decode_entry(&payload, record, &st.key)?;
        let name = if record.filename.is_empty() {
            fallback_name.unwrap_or_default().to_owned()
        } else {
            record.filename.clone()
        };
        Ok(VfsFile::assign(name, plaintext))
    }

    /// Decode the entry for a logical path.
    pub fn open(&self, path: &str) -> Result<VfsFile, ArchiveError> {
        self.open_index(name_index(path), Some(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.exists_index(name_index(path))
    }

    pub fn exists_index(&self, index: u32) -> bool {
        self.state.lock().unwrap().files.contains_key(&index)
    }

    /// Snapshot of the live entry records.
    pub fn enumerate(&self) -> Vec<FileRecord> {
        self.state.lock().unwrap().files.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Raw block copy ───────────────────────────────────────────────────────

    /// Capture one entry verbatim: the serialised record followed by the
    /// on-disk payload bytes, read through a mapped view.  The result can be
    /// re-inserted with [`Archive::write_raw`] without re-encoding.
    pub fn read_raw(&self, index: u32) -> Result<Vec<u8>, ArchiveError> {
        let st = self.state.lock().unwrap();
        let record = st.files.get(&index).ok_or(ArchiveError::NotFound(index))?;
        let backing = st
            .file
            .as_ref()
            .filter(|f| f.is_readable())
            .ok_or(ArchiveError::NotReadable)?;

        let mut block = record.to_bytes();
        if record.final_size > 0 {
            let view = VfsFile::map(backing.name(), record.offset, u64::from(record.final_size))?;
            let data = view.data().ok_or(ArchiveError::NotReadable)?;
            if data.len() < record.final_size as usize {
                return Err(ArchiveError::ShortRead {
                    expected: u64::from(record.final_size),
                    got: data.len() as u64,
                });
            }
            block.extend_from_slice(&data[..record.final_size as usize]);
        }
        Ok(block)
    }

    /// Re-insert a block captured by [`Archive::read_raw`], allocating a slot
    /// under the same best-fit rule as `write`.  Record semantics (flags,
    /// hash, sizes, payload bytes) are preserved exactly.
    pub fn write_raw(&self, block: &[u8]) -> Result<(), ArchiveError> {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        if !st.file.as_ref().is_some_and(VfsFile::is_writeable) {
            return Err(ArchiveError::NotWriteable);
        }
        if block.len() < RECORD_SIZE {
            return Err(ArchiveError::ShortRead {
                expected: RECORD_SIZE as u64,
                got: block.len() as u64,
            });
        }

        let mut record = FileRecord::read_from(&block[..RECORD_SIZE])?;
        let payload = &block[RECORD_SIZE..];
        if payload.len() < record.final_size as usize {
            return Err(ArchiveError::ShortRead {
                expected: u64::from(record.final_size),
                got: payload.len() as u64,
            });
        }

        Self::delete_slot(st, record.index)?;
        let (offset, num_blocks) = Self::reserve(st, u64::from(record.final_size))?;
        record.offset = offset;
        record.num_blocks = num_blocks;

        Self::store(st, &record, &payload[..record.final_size as usize])?;
        st.files.insert(record.index, record);
        Ok(())
    }

    /// Copy every entry of `src` into `dst` byte-for-byte, without decoding.
    pub fn copy_archive(src: &Archive, dst: &Archive) -> Result<(), ArchiveError> {
        for record in src.enumerate() {
            let block = src.read_raw(record.index)?;
            dst.write_raw(&block)?;
        }
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Path of the backing file, when loaded.
    pub fn file_name(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .file
            .as_ref()
            .map(|f| f.name().to_path_buf())
    }

    /// Parsed header, when loaded.
    pub fn header(&self) -> Option<ArchiveHeader> {
        self.state.lock().unwrap().header
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        // Key material does not outlive the handle.
        if let Ok(st) = self.state.get_mut() {
            Self::unload_state(st);
        }
    }
}
