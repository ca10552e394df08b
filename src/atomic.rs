use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Replaces `path` with `bytes` so readers see either the old or the new content.
///
/// The temp file lives in the target's directory so the final rename stays on one
/// filesystem.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent)?;

    let temp_path = temp_path_for(path, &parent);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    if let Err(err) = persist(file, bytes, &temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    sync_dir(&parent);
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "write committed");
    Ok(())
}

fn persist(mut file: File, bytes: &[u8], temp_path: &Path, path: &Path) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_path_for(path: &Path, parent: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    parent.join(format!(".{name}.{}.tmp", Uuid::now_v7()))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
