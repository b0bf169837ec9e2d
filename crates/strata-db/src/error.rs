use std::path::PathBuf;

use thiserror::Error;

use crate::SchemaVersion;

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Failures of a migration run. Every variant raised after the transaction
/// began implies the transaction was rolled back.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// A step or source was defined incorrectly. Raised while building it,
    /// before any database I/O.
    #[error("invalid migration definition: {0}")]
    Definition(String),

    #[error("migration canceled")]
    Canceled,

    #[error("migration step {step_index} (to version {target_version}) failed: {source}")]
    StepExecutionFailed {
        /// Position of the failing step within this run's plan.
        step_index: usize,
        target_version: SchemaVersion,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to commit migration: {source}")]
    CommitFailed {
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to open database {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to {context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("schema version {0} is outside the storable range")]
    InvalidVersion(i64),
}

impl MigrationError {
    pub(crate) fn storage(context: &'static str, source: rusqlite::Error) -> Self {
        Self::Storage { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_step_position() {
        let e = MigrationError::StepExecutionFailed {
            step_index: 2,
            target_version: 5,
            source: rusqlite::Error::InvalidQuery,
        };
        let text = e.to_string();
        assert!(text.starts_with("migration step 2 (to version 5) failed"));
    }

    #[test]
    fn display_for_simple_variants() {
        assert_eq!(MigrationError::Canceled.to_string(), "migration canceled");
        assert_eq!(
            MigrationError::Definition("empty sql".into()).to_string(),
            "invalid migration definition: empty sql"
        );
        assert_eq!(
            MigrationError::InvalidVersion(-1).to_string(),
            "schema version -1 is outside the storable range"
        );
    }
}
