//! This module provides the flat file inventory every benchmark phase is built from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::digest::{self, Digest, DigestState, FileDigest};
use crate::Error;

/// A regular file found while scanning.
///
/// Records are immutable once scanned and shared behind an [`Arc`] by every work unit referring to them.
#[derive(Debug)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Number of bytes hashed.
    pub size: u64,
    pub digest: Digest,
    /// Accumulator state right after the file's last byte.
    pub state: DigestState,
}

impl FileRecord {
    /// Digest the file at `path` and build its record.
    pub fn from_path(path: PathBuf) -> Result<Self, Error> {
        let FileDigest { digest, state, len } = digest::digest_file(&path)?;

        Ok(Self {
            path,
            size: len,
            digest,
            state,
        })
    }
}

/// Read-only set of scanned files.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    files: Vec<Arc<FileRecord>>,
}

impl Inventory {
    /// Recursively scan `root` for regular files.
    ///
    /// Directories, symlinks and other special entries are skipped, and so are entries the walk fails on: such
    /// errors are logged and never abort the scan. Failing to read a regular file is an error though.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, Error> {
        WalkDir::new(root.as_ref())
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Ignoring scan error: {err}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| -> Result<FileRecord, Error> {
                let record = FileRecord::from_path(entry.into_path())?;

                tracing::trace!("Scanned `{}`: {} bytes, sha256 {}", record.path.display(), record.size, record.digest);

                Ok(record)
            })
            .collect()
    }

    #[inline]
    pub fn files(&self) -> &[Arc<FileRecord>] {
        &self.files
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

impl FromIterator<FileRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(Arc::new).collect(),
        }
    }
}
