use std::io;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;

pub const DEFAULT_KEEP: usize = 5;

/// Ring of numbered snapshots `<name>.1` (newest) through `<name>.<keep>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRotator {
    dir: Option<PathBuf>,
    keep: usize,
}

impl Default for BackupRotator {
    fn default() -> Self {
        Self::new(None, DEFAULT_KEEP)
    }
}

impl BackupRotator {
    /// `dir = None` keeps backups next to the document.
    pub fn new(dir: Option<PathBuf>, keep: usize) -> Self {
        Self { dir, keep }
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn backup_path(&self, path: &Path, slot: usize) -> PathBuf {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{name}.{slot}");
        match self.dir.as_deref() {
            Some(dir) => dir.join(file_name),
            None => path.with_file_name(file_name),
        }
    }

    /// Shifts existing snapshots up one slot and copies the current document into
    /// slot 1. Every step is best effort.
    pub fn rotate(&self, path: &Path) {
        if self.keep == 0 || !path.exists() {
            return;
        }
        if let Some(dir) = self.dir.as_deref() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                tracing::debug!(dir = %dir.display(), error = %err, "backup dir unavailable");
                return;
            }
        }

        for slot in (1..self.keep).rev() {
            let from = self.backup_path(path, slot);
            if !from.exists() {
                continue;
            }
            let to = self.backup_path(path, slot + 1);
            if let Err(err) = std::fs::copy(&from, &to) {
                tracing::debug!(from = %from.display(), error = %err, "backup shift skipped");
            }
        }

        let newest = self.backup_path(path, 1);
        match std::fs::copy(path, &newest) {
            Ok(_) => tracing::debug!(backup = %newest.display(), "backup rotated"),
            Err(err) => tracing::debug!(error = %err, "backup of current document skipped"),
        }
    }

    /// Existing snapshots, newest first.
    pub fn list(&self, path: &Path) -> Vec<PathBuf> {
        (1..=self.keep)
            .map(|slot| self.backup_path(path, slot))
            .filter(|candidate| candidate.is_file())
            .collect()
    }

    /// Copies the newest existing snapshot back over the document.
    pub fn restore(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        let Some(source) = self.list(path).into_iter().next() else {
            return Ok(None);
        };
        let content = std::fs::read(&source)?;
        write_atomic(path, &content)?;
        tracing::warn!(
            document = %path.display(),
            backup = %source.display(),
            "document restored from backup"
        );
        Ok(Some(source))
    }
}
