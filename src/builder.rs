//! Bulk builder — one archive per job, jobs fanned out over the thread pool.
//!
//! Each job walks its source tree and writes every regular file into a fresh
//! archive.  Per file, in order: strip the source-root prefix, apply the
//! job's substring rewrites, normalise separators to `/`, drop the file if
//! any ignore pattern matches, read it, prepend the visual directory, write.
//!
//! Jobs are independent archives, so they run fully parallel; any failure
//! stops the whole build (there is no partial-archive recovery).

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::archive::{Archive, ArchiveError};
use crate::crypto::KEY_LENGTH;
use crate::file::FileError;
use crate::pack::{wildcard_match, PackError, VfsPack};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// An ordered `from → to` substring rewrite applied to logical paths.
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub from: String,
    pub to:   String,
}

/// One validated archiver job (see `config::load_jobs`).
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub archive_path: PathBuf,
    pub source_dir:   PathBuf,
    pub visual_dir:   String,
    pub key:          [u8; KEY_LENGTH],
    pub flags:        u8,
    pub version:      u32,
    pub ignores:      Vec<String>,
    pub patches:      Vec<PatchRule>,
}

/// Run every job in parallel.  The first failure aborts the pass.
pub fn run_jobs(pack: &VfsPack, jobs: &[BuildJob]) -> Result<(), BuildError> {
    jobs.par_iter().try_for_each(|job| {
        build_archive(pack, job).map(drop).inspect_err(|e| {
            error!(archive = %job.archive_path.display(), error = %e, "job failed");
        })
    })
}

/// Build one archive from one job and return its handle.
pub fn build_archive(pack: &VfsPack, job: &BuildJob) -> Result<Arc<Archive>, BuildError> {
    info!(
        archive = %job.archive_path.display(),
        dir = %job.source_dir.display(),
        "building archive"
    );

    let archive_path = job.archive_path.to_string_lossy();
    let file = pack.create(&archive_path, false)?;
    pack.set_archive_key(&archive_path, &job.key);

    let archive = Arc::new(Archive::new());
    archive.create(file, &job.key)?;

    let visual = job.visual_dir.replace('\\', "/");

    for entry in WalkDir::new(&job.source_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&job.source_dir)
            .unwrap_or(entry.path());
        let mut logical = relative.to_string_lossy().into_owned();

        // Each rule rewrites its first occurrence only, in declaration order.
        for patch in &job.patches {
            if let Some(at) = logical.find(&patch.from) {
                logical.replace_range(at..at + patch.from.len(), &patch.to);
                info!(from = %patch.from, to = %patch.to, path = %logical, "patch applied");
            }
        }
        logical = logical.replace('\\', "/");

        if job.ignores.iter().any(|pattern| wildcard_match(&logical, pattern)) {
            debug!(path = %logical, "content skipped");
            continue;
        }

        let data = fs::read(entry.path())?;
        if data.is_empty() {
            warn!(path = %entry.path().display(), "empty source file skipped");
            continue;
        }

        if !visual.is_empty() {
            logical = format!("{visual}{logical}");
        }
        archive.write(&logical, &data, job.flags, job.version)?;
    }

    info!(
        archive = %job.archive_path.display(),
        entries = archive.len(),
        "archive complete"
    );
    Ok(archive)
}
