//! Error types shared by the reconciler and its collaborators.
//!
//! Only [`ReconcileError::MissingArtifact`] is meant to fail an invocation;
//! store and collaborator failures are logged by the reconciler and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of an external collaborator (GitHub API, git, artifact download).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{operation} failed: {message}")]
    Call {
        operation: &'static str,
        message: String,
    },
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    pub fn call(operation: &'static str, message: impl Into<String>) -> Self {
        CollaboratorError::Call {
            operation,
            message: message.into(),
        }
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        CollaboratorError::Io { operation, source }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("preview key {0:?} already exists")]
    AlreadyExists(String),
    #[error("source directory {0} does not exist")]
    MissingSource(PathBuf),
    #[error("invalid preview key {0:?}")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The artifact facts could not be read, so there is nothing to reconcile.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read {file}: {source}")]
    Read {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pull request number {0:?}")]
    InvalidPrNumber(String),
    #[error("invalid merged flag {0:?}")]
    InvalidMerged(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("build artifact missing for PR #{pr_number}: expected HTML at {expected}")]
    MissingArtifact { pr_number: u64, expected: String },
}
