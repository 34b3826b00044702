//! Writing the saved layer back to disk as a diff against the source layers.

use std::io::Write as _;
use std::path::Path;

use strata_core::{
    CommandStream, ConfigError, ConfigFile, DIFF_METADATA, calculate_diff, write_stream,
};

use crate::version::{VERSION_KEY, VERSION_SECTION};

const LOCK_FILE: &str = ".strata.lock";
const SECTIONS_TO_SAVE: &str = "SectionsToSave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    Unchanged,
    /// The diff was empty and a stale saved file was removed.
    Deleted,
    /// Writes are disabled, the file opted out, or boot has not completed.
    Suppressed,
}

/// Render the saved file for a branch: the diff between `source` and
/// `source` with `saved` applied, stamped with `version`. `None` when there is
/// nothing to save.
pub fn render_saved(
    source: &ConfigFile,
    saved: &CommandStream,
    version: i64,
    allow_full_section_save: bool,
) -> Option<String> {
    let mut user = source.clone();
    user.apply_stream(saved);
    let mut diff = calculate_diff(source, &user);

    if !allow_full_section_save
        && let Some(listed) = source.array(SECTIONS_TO_SAVE, "Section")
        && !listed.is_empty()
    {
        let listed: Vec<&str> = listed.iter().map(|v| v.raw()).collect();
        diff.retain_sections(|section| listed.contains(&section));
    }
    if diff.is_empty() {
        return None;
    }

    let mut text = String::from(DIFF_METADATA);
    text.push('\n');
    text.push_str(&write_stream(&diff));
    text.push_str(&format!("[{VERSION_SECTION}]\n{VERSION_KEY}={version}\n"));
    Some(text)
}

/// Write or delete `dest` under an advisory lock on its directory.
pub fn save(dest: &Path, content: Option<&str>) -> Result<PersistOutcome, ConfigError> {
    match content {
        Some(content) => with_write_lock(dest, || {
            if write_atomic_if_changed(dest, content)? {
                tracing::debug!(path = %dest.display(), "saved config written");
                Ok(PersistOutcome::Written)
            } else {
                Ok(PersistOutcome::Unchanged)
            }
        }),
        None => match std::fs::remove_file(dest) {
            Ok(()) => {
                tracing::debug!(path = %dest.display(), "saved config empty, removed stale file");
                Ok(PersistOutcome::Deleted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistOutcome::Unchanged),
            Err(e) => Err(ConfigError::io(dest, e)),
        },
    }
}

fn with_write_lock<T>(
    dest: &Path,
    f: impl FnOnce() -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;

    let lock_path = parent.join(LOCK_FILE);
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| ConfigError::io(&lock_path, e))?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.write().map_err(|e| ConfigError::io(&lock_path, e))?;

    f()
}

fn write_atomic_if_changed(path: &Path, content: &str) -> Result<bool, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(existing) if existing == content => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ConfigError::io(path, e)),
    }
    atomic_write(path, content.as_bytes())?;
    Ok(true)
}

/// Write data to a file atomically using temp-file + rename.
fn atomic_write(target: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| ConfigError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| ConfigError::io(target, e))?;
    tmp.persist(target)
        .map_err(|e| ConfigError::io(target, e.error))?;
    Ok(())
}
