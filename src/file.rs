//! Uniform byte-stream handle over four backings.
//!
//! | Mode     | Backing                    | Read | Write | Seek |
//! |----------|----------------------------|------|-------|------|
//! | `Output` | disk, read + write         | yes  | yes   | yes  |
//! | `Input`  | disk, read only            | yes  | no    | yes  |
//! | `Mapped` | read-only memory map       | yes  | no    | cursor |
//! | `Memory` | owned or shared RAM buffer | yes  | no    | cursor |
//!
//! `Mapped` and `Memory` reads copy out of the buffer and advance an
//! internal cursor; disk modes delegate to the OS file position.  Mapping
//! rounds the requested offset down to the allocation granularity and
//! exposes a view that starts at the requested byte anyway.
//!
//! Dropping the handle releases whatever it owns: descriptor, mapping, or
//! buffer.  A buffer assigned via [`VfsFile::assign_shared`] is shared, not
//! owned, and survives the handle.

use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::header::FALLBACK_BLOCK_SIZE;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("handle is not readable")]
    NotReadable,
    #[error("handle is not writeable")]
    NotWriteable,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    None,
    Output,
    Input,
    Mapped,
    Memory,
}

enum Backing {
    None,
    Disk { file: File, writeable: bool },
    Mapped { map: Mmap, start: usize, len: usize, pos: u64 },
    Memory { data: Arc<[u8]>, pos: u64 },
}

pub struct VfsFile {
    name:    PathBuf,
    backing: Backing,
}

impl VfsFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Open a disk file for reading and writing (`Output` mode).
    /// `append = false` truncates an existing file; `append = true` keeps its
    /// contents and leaves the cursor at the start.
    pub fn create<P: AsRef<Path>>(path: P, append: bool) -> Result<Self, FileError> {
        let name = absolute(path.as_ref());
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true);
        if !append {
            opts.truncate(true);
        }
        let file = opts.open(&name)?;
        Ok(Self { name, backing: Backing::Disk { file, writeable: true } })
    }

    /// Open an existing disk file read-only (`Input` mode).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        let name = absolute(path.as_ref());
        let file = File::open(&name)?;
        Ok(Self { name, backing: Backing::Disk { file, writeable: false } })
    }

    /// Map a region of a disk file read-only (`Mapped` mode).
    ///
    /// `offset` is rounded down to the allocation granularity for the OS;
    /// the view still begins at the requested byte.  `size = 0` maps through
    /// to end of file.
    pub fn map<P: AsRef<Path>>(path: P, offset: u64, size: u64) -> Result<Self, FileError> {
        let name = absolute(path.as_ref());
        let file = File::open(&name)?;
        let file_len = file.metadata()?.len();

        let granularity = u64::from(page_size());
        let aligned = offset - offset % granularity;
        let start = (offset - aligned) as usize;

        let available = file_len.saturating_sub(offset);
        let len = if size == 0 { available } else { size.min(available) } as usize;
        if start + len == 0 {
            return Err(FileError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty mapping",
            )));
        }

        let map = unsafe {
            MmapOptions::new()
                .offset(aligned)
                .len(start + len)
                .map(&file)?
        };
        Ok(Self { name, backing: Backing::Mapped { map, start, len, pos: 0 } })
    }

    /// Wrap an owned buffer (`Memory` mode).
    pub fn assign<P: AsRef<Path>>(name: P, data: Vec<u8>) -> Self {
        Self::assign_shared(name, Arc::from(data))
    }

    /// Wrap a shared buffer (`Memory` mode) without copying; the buffer
    /// outlives this handle.
    pub fn assign_shared<P: AsRef<Path>>(name: P, data: Arc<[u8]>) -> Self {
        Self {
            name: name.as_ref().to_path_buf(),
            backing: Backing::Memory { data, pos: 0 },
        }
    }

    /// Release every resource and leave the handle in `None` mode.
    pub fn close(&mut self) {
        self.backing = Backing::None;
        self.name.clear();
    }

    // ── Byte access ──────────────────────────────────────────────────────────

    /// Read up to `buf.len()` bytes, returning the count actually read.
    /// Short only at end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        match &mut self.backing {
            Backing::Disk { file, .. } => {
                let mut total = 0;
                while total < buf.len() {
                    match file.read(&mut buf[total..])? {
                        0 => break,
                        n => total += n,
                    }
                }
                Ok(total)
            }
            Backing::Mapped { map, start, len, pos } => {
                let view = &map[*start..*start + *len];
                let at = (*pos).min(view.len() as u64) as usize;
                let n = buf.len().min(view.len() - at);
                buf[..n].copy_from_slice(&view[at..at + n]);
                *pos += n as u64;
                Ok(n)
            }
            Backing::Memory { data, pos } => {
                let at = (*pos).min(data.len() as u64) as usize;
                let n = buf.len().min(data.len() - at);
                buf[..n].copy_from_slice(&data[at..at + n]);
                *pos += n as u64;
                Ok(n)
            }
            Backing::None => Err(FileError::NotReadable),
        }
    }

    /// Write the whole buffer.  Only `Output` handles accept writes.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        match &mut self.backing {
            Backing::Disk { file, writeable: true } => {
                file.write_all(buf)?;
                Ok(buf.len())
            }
            _ => Err(FileError::NotWriteable),
        }
    }

    /// Move the cursor, absolutely or relative to the current position.
    pub fn set_position(&mut self, offset: i64, relative: bool) -> Result<(), FileError> {
        match &mut self.backing {
            Backing::Disk { file, .. } => {
                let from = if relative { SeekFrom::Current(offset) } else { SeekFrom::Start(offset.max(0) as u64) };
                file.seek(from)?;
                Ok(())
            }
            Backing::Mapped { pos, .. } | Backing::Memory { pos, .. } => {
                let base = if relative { *pos as i64 } else { 0 };
                *pos = (base + offset).max(0) as u64;
                Ok(())
            }
            Backing::None => Err(FileError::NotReadable),
        }
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn size(&self) -> u64 {
        match &self.backing {
            Backing::Disk { file, .. } => file.metadata().map(|m| m.len()).unwrap_or(0),
            Backing::Mapped { len, .. } => *len as u64,
            Backing::Memory { data, .. } => data.len() as u64,
            Backing::None => 0,
        }
    }

    pub fn position(&mut self) -> u64 {
        match &mut self.backing {
            Backing::Disk { file, .. } => file.stream_position().unwrap_or(0),
            Backing::Mapped { pos, .. } | Backing::Memory { pos, .. } => *pos,
            Backing::None => 0,
        }
    }

    /// Whole backing buffer for `Mapped` and `Memory` handles.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Mapped { map, start, len, .. } => Some(&map[*start..*start + *len]),
            Backing::Memory { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn mode(&self) -> FileMode {
        match &self.backing {
            Backing::None => FileMode::None,
            Backing::Disk { writeable: true, .. } => FileMode::Output,
            Backing::Disk { writeable: false, .. } => FileMode::Input,
            Backing::Mapped { .. } => FileMode::Mapped,
            Backing::Memory { .. } => FileMode::Memory,
        }
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self.backing, Backing::None)
    }

    pub fn is_writeable(&self) -> bool {
        matches!(self.backing, Backing::Disk { writeable: true, .. })
    }

    pub fn name(&self) -> &Path {
        &self.name
    }
}

impl std::fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsFile")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .field("size", &self.size())
            .finish()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// OS page size; doubles as the mapping allocation granularity and the
/// default archive block size.
#[cfg(unix)]
pub fn page_size() -> u32 {
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n <= 0 {
        FALLBACK_BLOCK_SIZE
    } else {
        n as u32
    }
}

#[cfg(not(unix))]
pub fn page_size() -> u32 {
    FALLBACK_BLOCK_SIZE
}
