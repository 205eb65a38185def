//! # contract: interfaces to everything outside the reconciler
//!
//! The reconciler never talks to GitHub, git or the network directly. It goes
//! through the traits below, which the `docs-preview` crate implements for real
//! and tests replace with `mockall` mocks or [`crate::store::MemoryPreviewStore`].
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; mocks are exported under the
//!   `test-export-mocks` feature so the CLI crate's tests can use them too.
//! - Collaborator failures are reported as [`CollaboratorError`] and treated as
//!   soft by the reconciler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

use crate::error::{CollaboratorError, StoreError};

/// Where the repository's GitHub Pages site is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagesSite {
    /// Public base URL, e.g. `https://org.github.io/project/`.
    pub url: String,
    /// Branch the site is deployed from.
    pub branch: String,
}

/// Snapshot of a preview directory: relative file path to contents.
pub type PreviewTree = BTreeMap<PathBuf, Vec<u8>>;

/// Result of committing and pushing the preview branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishOutcome {
    Pushed,
    /// The working tree had no changes; not an error.
    NothingToCommit,
}

/// Looks up the Pages configuration of a repository.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PagesLookup: Send + Sync {
    /// `Ok(None)` means no Pages site is configured and previews are skipped.
    async fn pages_site(&self, repo: &str) -> Result<Option<PagesSite>, CollaboratorError>;
}

/// Comment thread of a pull request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommentThread: Send + Sync {
    /// Bodies of all existing comments on the PR.
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<String>, CollaboratorError>;

    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<(), CollaboratorError>;
}

/// Commits and pushes whatever the store changed in the preview branch.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<PublishOutcome, CollaboratorError>;
}

/// Retrieves the upstream build's artifact for a workflow run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Extracts the artifact into `dest` and returns the artifact directory.
    async fn fetch(&self, run_id: u64, dest: &Path) -> Result<PathBuf, CollaboratorError>;
}

/// Key-value view of the preview branch, addressed by slash-separated path keys
/// such as `review/pr-42`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait PreviewStore: Send + Sync {
    fn exists(&self, key: &str) -> bool;

    fn get(&self, key: &str) -> Result<Option<PreviewTree>, StoreError>;

    /// Moves the directory at `source` into `key`. The key must be free.
    fn put(&self, key: &str, source: &Path) -> Result<(), StoreError>;

    /// Removes `key`; returns whether anything was there.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
