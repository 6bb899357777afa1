//! On-disk cache of raw inschrijving responses.
//!
//! Entries are plain files whose name starts with the KVK number, so a cached
//! file can be annotated by hand (`12345678-bakkerij.xml`) without breaking
//! lookup. Entries never expire and are never pruned.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{InschrijvingError, InschrijvingResult};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cache-inschrijvingen";

/// Extension used when writing a new entry.
pub const CACHE_EXTENSION: &str = "xml";

/// Storage for raw response documents keyed by KVK number.
pub trait CacheStore: Send + Sync {
    /// Locate the entry with the smallest file name starting with `kvk_nummer`.
    fn find(&self, kvk_nummer: &str) -> Option<PathBuf>;

    /// Read an entry fully.
    fn load(&self, path: &Path) -> InschrijvingResult<Vec<u8>>;

    /// Persist `document` as the entry for `kvk_nummer`.
    fn store(&self, kvk_nummer: &str, document: &[u8]) -> InschrijvingResult<PathBuf>;
}

/// Cache backed by a single flat directory.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    directory: PathBuf,
}

impl DirectoryCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a fresh entry for `kvk_nummer` is written to.
    pub fn entry_path(&self, kvk_nummer: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", kvk_nummer, CACHE_EXTENSION))
    }

    fn create_directory(&self) -> std::io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.directory)
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl CacheStore for DirectoryCache {
    fn find(&self, kvk_nummer: &str) -> Option<PathBuf> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                trace!(directory = %self.directory.display(), error = %e, "Cache directory not readable");
                return None;
            }
        };

        // Listing order is arbitrary; the smallest matching name wins.
        entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(kvk_nummer))
            .min_by_key(|entry| entry.file_name())
            .map(|entry| entry.path())
    }

    fn load(&self, path: &Path) -> InschrijvingResult<Vec<u8>> {
        fs::read(path).map_err(|e| {
            InschrijvingError::CacheRead(format!("{}: {}", path.display(), e))
        })
    }

    fn store(&self, kvk_nummer: &str, document: &[u8]) -> InschrijvingResult<PathBuf> {
        self.create_directory()?;

        let target = self.entry_path(kvk_nummer);
        // Leading dot keeps the temp file out of prefix lookups.
        let temp = self
            .directory
            .join(format!(".{}.{}.tmp", kvk_nummer, Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&temp, document).and_then(|()| fs::rename(&temp, &target)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(path = %target.display(), bytes = document.len(), "Stored inschrijving in cache");
        Ok(target)
    }
}
