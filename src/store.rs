use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::atomic::write_atomic;
use crate::backups::BackupRotator;
use crate::document::{self, Document, CURRENT_VERSION};
use crate::locks::{lock_path_for, FileLock, LockError};
use crate::migrate::as_counter;

pub const ARCHIVE_FILE_NAME: &str = "archive.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "{} uses schema version {found}, but this build only understands up to {supported}",
        path.display()
    )]
    SchemaTooNew {
        path: PathBuf,
        found: u64,
        supported: u64,
    },
}

/// Archive document living next to the primary one.
pub fn archive_path_for(primary: &Path) -> PathBuf {
    primary.with_file_name(ARCHIVE_FILE_NAME)
}

/// Load/save access to one document path, with its lock and backup ring.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    backups: BackupRotator,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>, backups: BackupRotator) -> Self {
        Self {
            path: path.into(),
            backups,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupRotator {
        &self.backups
    }

    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }

    pub fn lock(&self) -> Result<FileLock, StoreError> {
        Ok(FileLock::acquire(&self.lock_path())?)
    }

    /// Raw bytes of the document, `None` when it does not exist yet.
    pub fn read_raw(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Lenient load. Refuses documents written by a newer schema.
    pub fn load(&self) -> Result<Document, StoreError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(Document::default());
        };
        self.ensure_supported(&raw)?;
        let mut document = document::load(&raw);
        if document.version != CURRENT_VERSION {
            tracing::debug!(
                path = %self.path.display(),
                from = document.version,
                "older document stamped with the current version"
            );
            document.version = CURRENT_VERSION;
        }
        Ok(document)
    }

    /// Rotates backups of the current content, then replaces the document.
    pub fn save(&self, document: &Document) -> Result<(), StoreError> {
        self.backups.rotate(&self.path);
        write_atomic(&self.path, &document::dump(document)).map_err(|source| self.io_error(source))
    }

    /// Writes an empty document when none exists. No backup is taken.
    pub fn create_if_missing(&self) -> Result<bool, StoreError> {
        if self.path.exists() {
            return Ok(false);
        }
        write_atomic(&self.path, &document::dump(&Document::default()))
            .map_err(|source| self.io_error(source))?;
        Ok(true)
    }

    /// One locked load→mutate→save cycle. Nothing is written when `mutate` fails,
    /// and the lock is released on every path.
    pub fn update<T, E>(&self, mutate: impl FnOnce(&mut Document) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock()?;
        let mut document = self.load()?;
        let outcome = mutate(&mut document)?;
        self.save(&document)?;
        Ok(outcome)
    }

    pub fn restore_latest_backup(&self) -> Result<Option<PathBuf>, StoreError> {
        self.backups
            .restore(&self.path)
            .map_err(|source| self.io_error(source))
    }

    fn ensure_supported(&self, raw: &[u8]) -> Result<(), StoreError> {
        let found = serde_json::from_slice::<Value>(raw)
            .ok()
            .and_then(|value| value.get("version").and_then(as_counter));
        match found {
            Some(found) if found > CURRENT_VERSION => Err(StoreError::SchemaTooNew {
                path: self.path.clone(),
                found,
                supported: CURRENT_VERSION,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
