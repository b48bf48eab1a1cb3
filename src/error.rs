//! Error types for the migration pipeline.
//!
//! Library code returns [`MigrationError`]; the command layer wraps it in
//! `anyhow` for reporting. Each variant maps to one failure class of the run
//! summary (see [`MigrationError::is_skip`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::derivative::DerivativeError;
use crate::structure::StructureError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no namespace configured for collection '{0}'")]
    UnknownCollection(String),

    #[error("no content model configured for item type '{0}'")]
    UnknownItemType(String),

    #[error("item {item} has no {file_use} file")]
    MissingRequiredFile { item: String, file_use: String },

    #[error("structural metadata: {0}")]
    Structure(#[from] StructureError),

    #[error("derivative generation failed: {0}")]
    Derivative(#[from] DerivativeError),

    #[error("repository unreachable at {url}: {message}")]
    RepositoryConnection { url: String, message: String },

    #[error("repository write failed for {pid} ({what}): {message}")]
    RepositoryWrite {
        pid: String,
        what: String,
        message: String,
    },

    #[error("page basename '{0}' is not numeric; cannot derive its page number")]
    SequenceParse(String),

    #[error("no structural label for page file '{0}'")]
    MissingLabel(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR archive {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("legacy metadata store: {0}")]
    Legacy(#[from] sqlx::Error),
}

impl MigrationError {
    /// Configuration lookups and absent required files skip the item rather
    /// than counting as a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            MigrationError::UnknownCollection(_)
                | MigrationError::UnknownItemType(_)
                | MigrationError::MissingRequiredFile { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MigrationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_missing_file_errors_are_skips() {
        assert!(MigrationError::UnknownCollection("x".into()).is_skip());
        assert!(MigrationError::UnknownItemType("x".into()).is_skip());
        assert!(MigrationError::MissingRequiredFile {
            item: "a".into(),
            file_use: "MODS".into()
        }
        .is_skip());
        assert!(!MigrationError::SequenceParse("p1".into()).is_skip());
        assert!(!MigrationError::RepositoryConnection {
            url: "http://x".into(),
            message: "down".into()
        }
        .is_skip());
    }
}
