//! This module expands an inventory into the work units of a benchmark phase.

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;

use crate::digest::{self, Digest};
use crate::inventory::FileRecord;
use crate::Error;

/// Default length of the random suffix appended to uploaded files.
pub const SUFFIX_LEN: usize = 16;

/// A request to fetch a known object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadUnit {
    pub digest: Digest,
    pub size: u64,
}

impl From<&FileRecord> for DownloadUnit {
    #[inline]
    fn from(file: &FileRecord) -> Self {
        Self {
            digest: file.digest,
            size: file.size,
        }
    }
}

/// A request to store a file, optionally followed by extra suffix bytes.
///
/// When `extra` is not empty, `digest` is derived from the file's serialized digest state instead of rehashing
/// the file, and `size` accounts for the suffix.
#[derive(Debug, Clone)]
pub struct UploadUnit {
    pub source: Arc<FileRecord>,
    pub extra: Bytes,
    pub digest: Digest,
    pub size: u64,
}

impl UploadUnit {
    /// Upload `source` as is.
    pub fn unmodified(source: Arc<FileRecord>) -> Self {
        Self {
            digest: source.digest,
            size: source.size,
            extra: Bytes::new(),
            source,
        }
    }

    /// Upload `source` followed by `extra`.
    pub fn enhanced(source: Arc<FileRecord>, extra: Bytes) -> Result<Self, Error> {
        if extra.is_empty() {
            return Ok(Self::unmodified(source));
        }

        Ok(Self {
            digest: digest::extend_digest(&source.state, &extra)?,
            size: source.size + extra.len() as u64,
            extra,
            source,
        })
    }
}

/// One atomic transfer task, consumed by exactly one worker.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Download(DownloadUnit),
    Upload(UploadUnit),
}

impl WorkUnit {
    /// Number of bytes the unit transfers.
    #[inline]
    pub fn size(&self) -> u64 {
        match self {
            WorkUnit::Download(unit) => unit.size,
            WorkUnit::Upload(unit) => unit.size,
        }
    }
}

impl From<DownloadUnit> for WorkUnit {
    #[inline]
    fn from(unit: DownloadUnit) -> Self {
        WorkUnit::Download(unit)
    }
}

impl From<UploadUnit> for WorkUnit {
    #[inline]
    fn from(unit: UploadUnit) -> Self {
        WorkUnit::Upload(unit)
    }
}

/// Repeat the whole file set `iterations` times.
pub fn build_download_units(files: &[Arc<FileRecord>], iterations: u32) -> Vec<DownloadUnit> {
    let mut units = Vec::with_capacity(files.len() * iterations as usize);

    for _ in 0..iterations {
        units.extend(files.iter().map(|file| DownloadUnit::from(file.as_ref())));
    }

    units
}

/// Repeat the whole file set `iterations` times, each iteration with its own random suffix.
///
/// A single suffix of `suffix_len` bytes is drawn per iteration and shared by every file of that iteration, so
/// that deriving each digest only costs the suffix length.
pub fn build_upload_units(
    files: &[Arc<FileRecord>],
    iterations: u32,
    suffix_len: usize,
    rng: &mut impl RngCore,
) -> Result<Vec<UploadUnit>, Error> {
    let mut units = Vec::with_capacity(files.len() * iterations as usize);

    for _ in 0..iterations {
        let mut extra = vec![0; suffix_len];
        rng.fill_bytes(&mut extra);
        let extra = Bytes::from(extra);

        for file in files {
            units.push(UploadUnit::enhanced(Arc::clone(file), extra.clone())?);
        }
    }

    Ok(units)
}
