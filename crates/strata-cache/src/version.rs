//! Saved-layer version stamping and migration.

use strata_core::{CommandStream, ConfigError, ConfigFile};

pub const VERSION_SECTION: &str = "CurrentIniVersion";
pub const VERSION_KEY: &str = "Version";

/// What [`migrate`] did to the saved layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    UpToDate,
    /// Source was newer; non-preserved saved sections were dropped.
    Reset { from: i64, to: i64, dropped: usize },
    /// Saved layer claims a newer version than the source. Left untouched.
    Downgrade { saved: i64, source: i64 },
}

/// Version declared by a merged source file. Missing or unparsable is 0.
pub fn source_version(file: &ConfigFile) -> i64 {
    file.value(VERSION_SECTION, VERSION_KEY)
        .and_then(|v| v.raw().trim().parse().ok())
        .unwrap_or(0)
}

/// Strip the version stamp out of a freshly read saved layer and return it.
/// A saved layer without a stamp is version 0.
pub fn take_saved_version(saved: &mut CommandStream) -> i64 {
    let version = saved
        .last_set(VERSION_SECTION, VERSION_KEY)
        .and_then(|v| v.raw().trim().parse().ok())
        .unwrap_or(0);
    saved.remove_section(VERSION_SECTION);
    version
}

/// Bring the saved layer up to `source` version.
pub fn migrate(
    branch: &str,
    saved: &mut CommandStream,
    saved_version: &mut i64,
    source: i64,
    preserve: &[String],
) -> Migration {
    if source > *saved_version {
        let before = saved.section_names().len();
        saved.retain_sections(|section| preserve.iter().any(|p| p == section));
        let dropped = before - saved.section_names().len();
        tracing::info!(
            branch,
            from = *saved_version,
            to = source,
            dropped,
            "saved config is older than source, resetting non-preserved sections"
        );
        let from = *saved_version;
        *saved_version = source;
        Migration::Reset {
            from,
            to: source,
            dropped,
        }
    } else if source < *saved_version {
        let conflict = ConfigError::VersionConflict {
            branch: branch.to_string(),
            saved: *saved_version,
            source_version: source,
        };
        tracing::warn!("{conflict}; leaving saved config untouched");
        Migration::Downgrade {
            saved: *saved_version,
            source,
        }
    } else {
        Migration::UpToDate
    }
}
