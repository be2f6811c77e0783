//! Job-list loading — the archiver's JSON configuration.
//!
//! The job list is an array of objects:
//!
//! ```json
//! [{
//!   "dir":       "assets",            // source directory (must exist)
//!   "visualdir": "data/",             // logical prefix inside the archive
//!   "file":      "out/assets.vfa",    // output archive (must NOT exist)
//!   "key":       [0, 0, ... 1],       // 32 bytes; absent in lite builds
//!   "type":      3,                   // flags: 1 = LZ4, 2 = AES-256
//!   "version":   7,                   // non-zero, stored per entry
//!   "ignores":   ["*.tmp"],           // optional wildcard patterns
//!   "patches":   {"src/": "lib/"}     // optional ordered substring rewrites
//! }]
//! ```
//!
//! Validation is strict and happens before any job runs: a bad list never
//! produces a partial build.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::builder::{BuildJob, PatchRule};
use crate::crypto::KEY_LENGTH;
use crate::entry::FLAG_MAX;

/// Compiled-in archive key for `lite` builds (job lists carry no `key`).
pub const LITE_CRYPT_KEY: [u8; KEY_LENGTH] = [
    0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0,
    0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x1,
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("job list {0} does not exist")]
    Missing(PathBuf),
    #[error("job list is empty")]
    Empty,
    #[error("source directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("target archive {0} already exists")]
    OutputExists(PathBuf),
    #[error("job has no key (expected {KEY_LENGTH} bytes)")]
    MissingKey,
    #[error("key must be {KEY_LENGTH} bytes, got {0}")]
    BadKey(usize),
    #[error("unallowed type {0} (must be below {FLAG_MAX})")]
    BadFlags(u8),
    #[error("version is null")]
    NullVersion,
    #[error("patch value for {0:?} is not a string")]
    BadPatch(String),
    #[error("job list parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct RawJob {
    dir:       String,
    visualdir: String,
    file:      String,
    #[serde(default)]
    key:       Option<Vec<u8>>,
    #[serde(rename = "type")]
    flags:     u8,
    version:   u32,
    #[serde(default)]
    ignores:   Vec<String>,
    #[serde(default)]
    patches:   serde_json::Map<String, serde_json::Value>,
}

/// Parse and validate a job list.
pub fn load_jobs(path: &Path) -> Result<Vec<BuildJob>, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    info!(config = %path.display(), "loading job list");

    let raw: Vec<RawJob> = serde_json::from_str(&fs::read_to_string(path)?)?;
    if raw.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut jobs = Vec::with_capacity(raw.len());
    for job in raw {
        let source_dir = PathBuf::from(&job.dir);
        if !source_dir.is_dir() {
            return Err(ConfigError::MissingDirectory(source_dir));
        }

        let archive_path = PathBuf::from(&job.file);
        if archive_path.exists() {
            return Err(ConfigError::OutputExists(archive_path));
        }

        let key: [u8; KEY_LENGTH] = if cfg!(feature = "lite") {
            LITE_CRYPT_KEY
        } else {
            let raw_key = job.key.ok_or(ConfigError::MissingKey)?;
            let len = raw_key.len();
            raw_key.try_into().map_err(|_| ConfigError::BadKey(len))?
        };

        if job.flags >= FLAG_MAX {
            return Err(ConfigError::BadFlags(job.flags));
        }
        if job.version == 0 {
            return Err(ConfigError::NullVersion);
        }

        // preserve_order keeps the patches in declaration order.
        let mut patches = Vec::with_capacity(job.patches.len());
        for (from, to) in job.patches {
            let to = to
                .as_str()
                .ok_or_else(|| ConfigError::BadPatch(from.clone()))?
                .to_owned();
            patches.push(PatchRule { from, to });
        }

        info!(
            archive = %archive_path.display(),
            dir = %source_dir.display(),
            visual = %job.visualdir,
            "job accepted"
        );
        jobs.push(BuildJob {
            archive_path,
            source_dir,
            visual_dir: job.visualdir,
            key,
            flags: job.flags,
            version: job.version,
            ignores: job.ignores,
            patches,
        });
    }

    info!(jobs = jobs.len(), "job list loaded");
    Ok(jobs)
}
