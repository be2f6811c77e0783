//! Pack registry — the process-scoped view over every known archive.
//!
//! Holds three things per process: the declared archive set (name keyed by
//! resolution path, `"*"` matching anything), the per-archive key material,
//! and the list of currently loaded handles.  All paths are normalised to
//! their lowercased absolute form before they become map keys, so an archive
//! has at most one live handle regardless of how callers spell its path.
//!
//! `Open` overlays loaded archives over the real filesystem: archives are
//! searched first (most recently loaded wins, which after
//! [`VfsPack::load_registered`] means last-registered wins), then the path
//! is tried on disk.
//!
//! The registry is usually a process singleton with an
//! `initialize`/`finalize` lifecycle; [`VfsPack::new`] stays public so tests
//! can run isolated registries.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{Archive, ArchiveError};
use crate::crypto::{CryptoError, KEY_LENGTH};
use crate::file::{FileError, VfsFile};

pub use crate::crypto::key_from_ascii;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("no key registered for archive {0}")]
    KeyNotFound(String),
    #[error("pack registry already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Default)]
struct PackState {
    /// Lowercased absolute archive path → 32-byte key.
    archive_keys: HashMap<String, [u8; KEY_LENGTH]>,
    /// Lowercased resolution path (`"*"` = any) → lowercased archive name.
    registered:   HashMap<String, String>,
    /// Archive names in registration order.
    names:        Vec<String>,
    /// Currently loaded handles; front is searched first by `open`.
    archives:     Vec<Arc<Archive>>,
}

pub struct VfsPack {
    state: Mutex<PackState>,
}

static GLOBAL: OnceLock<VfsPack> = OnceLock::new();

impl VfsPack {
    pub fn new() -> Self {
        Self { state: Mutex::new(PackState::default()) }
    }

    // ── Process lifecycle ────────────────────────────────────────────────────

    /// Install the process-global registry and bring up the log sink.
    /// Calling this twice is a programming error.
    pub fn initialize() -> Result<&'static VfsPack, PackError> {
        crate::log::init();
        if GLOBAL.get().is_some() {
            return Err(PackError::AlreadyInitialized);
        }
        info!("VFS pack initialized");
        Ok(GLOBAL.get_or_init(VfsPack::new))
    }

    /// The global registry.  Panics when [`VfsPack::initialize`] has not run.
    pub fn instance() -> &'static VfsPack {
        GLOBAL.get().expect("VfsPack::initialize must be called first")
    }

    /// Unload every archive and clear the registry.  Must follow all other
    /// pack operations.
    pub fn finalize(&self) {
        let mut st = self.state.lock().unwrap();
        for archive in st.archives.drain(..) {
            archive.unload();
        }
        st.archive_keys.clear();
        st.registered.clear();
        st.names.clear();
        info!("VFS pack finalized");
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Declare an archive under a resolution path (`"*"` matches any path).
    pub fn register(&self, name: &str, path: &str) {
        let mut st = self.state.lock().unwrap();
        let name = name.to_lowercase();
        debug!(archive = %name, path, "archive registered");
        st.registered.insert(path.to_lowercase(), name.clone());
        st.names.push(name);
    }

    pub fn unregister(&self, name: &str) {
        let mut st = self.state.lock().unwrap();
        let name = name.to_lowercase();
        st.registered.retain(|_, v| *v != name);
        st.names.retain(|n| *n != name);
    }

    /// Load every registered archive, most recently registered first, fanned
    /// out over the thread pool.  Any failure aborts the whole pass.
    pub fn load_registered(&self) -> Result<(), PackError> {
        let names: Vec<String> = {
            let st = self.state.lock().unwrap();
            st.names.iter().rev().cloned().collect()
        };
        names.par_iter().try_for_each(|name| {
            self.load_archive(name).map(drop)
        })
    }

    // ── Archive handles ──────────────────────────────────────────────────────

    /// Load an archive, or return the existing handle for the same backing
    /// path.  The key must have been supplied via
    /// [`VfsPack::set_archive_key`] beforehand.
    pub fn load_archive(&self, path: &str) -> Result<Arc<Archive>, PackError> {
        let key_path = resolution_key(path);
        let mut st = self.state.lock().unwrap();

        if let Some(existing) = Self::find_loaded(&st, &key_path) {
            return Ok(existing);
        }

        let key = st
            .archive_keys
            .get(&key_path)
            .copied()
            .ok_or_else(|| PackError::KeyNotFound(key_path.clone()))?;

        let file = VfsFile::open(absolute_path(Path::new(path)))?;
        let archive = Arc::new(Archive::new());
        archive.load(file, &key)?;

        st.archives.push(Arc::clone(&archive));
        Ok(archive)
    }

    /// Look up a loaded handle by backing path without loading anything.
    pub fn find_archive(&self, path: &str) -> Option<Arc<Archive>> {
        let key_path = resolution_key(path);
        let st = self.state.lock().unwrap();
        Self::find_loaded(&st, &key_path)
    }

    fn find_loaded(st: &PackState, key_path: &str) -> Option<Arc<Archive>> {
        st.archives
            .iter()
            .find(|a| {
                a.file_name()
                    .is_some_and(|n| n.to_string_lossy().to_lowercase() == key_path)
            })
            .cloned()
    }

    /// Drop a handle from the loaded set; the archive itself is unloaded
    /// when the last reference goes away.
    pub fn unload_archive(&self, archive: &Arc<Archive>) {
        let mut st = self.state.lock().unwrap();
        st.archives.retain(|a| !Arc::ptr_eq(a, archive));
    }

    // ── File access ──────────────────────────────────────────────────────────

    /// Create a disk file for writing; `append = true` keeps existing
    /// contents.
    pub fn create(&self, path: &str, append: bool) -> Result<VfsFile, PackError> {
        Ok(VfsFile::create(absolute_path(Path::new(path)), append)?)
    }

    /// Open a logical path: loaded archives first, the real filesystem as
    /// fallback.
    pub fn open(&self, path: &str) -> Result<VfsFile, PackError> {
        let archives: Vec<Arc<Archive>> = {
            let st = self.state.lock().unwrap();
            st.archives.clone()
        };
        for archive in &archives {
            if let Ok(file) = archive.open(path) {
                return Ok(file);
            }
        }
        Ok(VfsFile::open(path)?)
    }

    // ── Keys and paths ───────────────────────────────────────────────────────

    pub fn set_archive_key(&self, path: &str, key: &[u8; KEY_LENGTH]) {
        let mut st = self.state.lock().unwrap();
        st.archive_keys.insert(resolution_key(path), *key);
    }

    pub fn set_working_directory(&self, dir: &str) -> Result<(), PackError> {
        std::env::set_current_dir(absolute_path(Path::new(dir)))?;
        Ok(())
    }

    pub fn working_directory(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_default()
    }

    pub fn executable_directory(&self) -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_default()
    }

    /// Declared archive set: resolution path → archive name.
    pub fn registered_archives(&self) -> HashMap<String, String> {
        self.state.lock().unwrap().registered.clone()
    }

    /// Currently loaded handles.
    pub fn archives(&self) -> Vec<Arc<Archive>> {
        self.state.lock().unwrap().archives.clone()
    }
}

impl Default for VfsPack {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute form of `path` without requiring it to exist.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lowercased absolute path — the key every registry map uses.
fn resolution_key(path: &str) -> String {
    absolute_path(Path::new(path)).to_string_lossy().to_lowercase()
}

/// Glob-style match: `?` consumes exactly one character, `*` zero or more.
pub fn wildcard_match(text: &str, pattern: &str) -> bool {
    let mut p = pattern.chars();
    match p.next() {
        None => text.is_empty(),
        Some('?') => {
            let mut t = text.chars();
            t.next().is_some() && wildcard_match(t.as_str(), p.as_str())
        }
        Some('*') => {
            if wildcard_match(text, p.as_str()) {
                return true;
            }
            let mut t = text.chars();
            t.next().is_some() && wildcard_match(t.as_str(), pattern)
        }
        Some(c) => {
            let mut t = text.chars();
            t.next() == Some(c) && wildcard_match(t.as_str(), p.as_str())
        }
    }
}
