use std::path::PathBuf;

/// Errors raised by the configuration engine.
///
/// Only `UnresolvedDestination` is ever fatal to a branch build. Everything else
/// degrades to "treat the key as absent" at the public accessor boundary.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{source_name}:{line}: malformed line: {reason}")]
    MalformedLine {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Cannot determine a saved-config destination for branch '{branch}' on '{platform}'")]
    UnresolvedDestination { branch: String, platform: String },

    #[error("Saved config for '{branch}' is version {saved}, newer than source version {source_version}")]
    VersionConflict {
        branch: String,
        saved: i64,
        source_version: i64,
    },

    #[error("Edit of '{section}' applied to {succeeded} branch(es) but failed for: {}", .failed.join(", "))]
    PartialStructuralEdit {
        section: String,
        succeeded: usize,
        failed: Vec<String>,
    },

    #[error("Unknown branch '{0}'")]
    UnknownBranch(String),

    #[error("Branch '{0}' does not retain individual static layers")]
    ReplayUnavailable(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal problem found while parsing one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub reason: String,
}

impl ParseDiagnostic {
    /// Promote the diagnostic to a `MalformedLine` error carrying the layer name.
    pub fn into_error(self, source_name: &str) -> ConfigError {
        ConfigError::MalformedLine {
            source_name: source_name.to_string(),
            line: self.line,
            reason: self.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_malformed_line() {
        let err = ParseDiagnostic {
            line: 7,
            reason: "missing '='".into(),
        }
        .into_error("DefaultEngine.ini");
        assert_eq!(
            err.to_string(),
            "DefaultEngine.ini:7: malformed line: missing '='"
        );
    }

    #[test]
    fn test_display_unresolved_destination() {
        let err = ConfigError::UnresolvedDestination {
            branch: "Engine".into(),
            platform: "Linux".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot determine a saved-config destination for branch 'Engine' on 'Linux'"
        );
    }

    #[test]
    fn test_display_partial_structural_edit() {
        let err = ConfigError::PartialStructuralEdit {
            section: "Core.System".into(),
            succeeded: 2,
            failed: vec!["Game".into(), "Input".into()],
        };
        assert_eq!(
            err.to_string(),
            "Edit of 'Core.System' applied to 2 branch(es) but failed for: Game, Input"
        );
    }

    #[test]
    fn test_display_version_conflict() {
        let err = ConfigError::VersionConflict {
            branch: "Game".into(),
            saved: 4,
            source_version: 3,
        };
        assert!(err.to_string().contains("version 4"));
        assert!(err.to_string().contains("source version 3"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
    }
}
