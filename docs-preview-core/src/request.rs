//! The per-invocation reconciliation request and how it is read from a build artifact.
//!
//! An artifact directory carries three one-line fact files next to the rendered
//! HTML:
//!
//! ```text
//! <artifact>/pr.txt      # pull request number
//! <artifact>/merged.txt  # "true" or "false"
//! <artifact>/action.txt  # opened | synchronize | reopened | closed | ...
//! <artifact>/html/       # rendered documentation
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::RequestError;

pub const DEFAULT_PREVIEW_ROOT: &str = "review";
pub const DEFAULT_HTML_DIR: &str = "html";

/// Pull request lifecycle event that triggered the upstream build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PrAction {
    Opened,
    Synchronized,
    Reopened,
    Closed,
    Other(String),
}

impl PrAction {
    /// Accepts GitHub's spellings; anything unknown is kept verbatim as `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "opened" => PrAction::Opened,
            "synchronize" | "synchronized" => PrAction::Synchronized,
            "reopened" => PrAction::Reopened,
            "closed" => PrAction::Closed,
            _ => PrAction::Other(raw.trim().to_string()),
        }
    }

    /// True for the events that (re)publish a preview.
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            PrAction::Opened | PrAction::Synchronized | PrAction::Reopened
        )
    }
}

impl fmt::Display for PrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrAction::Opened => f.write_str("opened"),
            PrAction::Synchronized => f.write_str("synchronize"),
            PrAction::Reopened => f.write_str("reopened"),
            PrAction::Closed => f.write_str("closed"),
            PrAction::Other(raw) => f.write_str(raw),
        }
    }
}

/// Everything the reconciler needs to know about one pull request event.
///
/// Whether the preview comment was already posted is deliberately absent:
/// it is asked from the comment thread on every run.
#[derive(Debug, Clone)]
pub struct ReconciliationRequest {
    pub pr_number: u64,
    pub merged: bool,
    pub action: PrAction,
    /// Store key under which all `pr-*` previews live.
    pub preview_root: String,
    /// Rendered HTML, `Some` only when the build produced it.
    pub artifact_path: Option<PathBuf>,
}

impl ReconciliationRequest {
    /// Store key of this PR's preview directory, e.g. `review/pr-42`.
    pub fn preview_path(&self) -> String {
        let root = self.preview_root.trim_matches('/');
        if root.is_empty() {
            format!("pr-{}", self.pr_number)
        } else {
            format!("{}/pr-{}", root, self.pr_number)
        }
    }

    /// Reads the fact files of an artifact directory.
    ///
    /// `artifact_path` is set only if `dir/html_dir` exists; a missing HTML tree
    /// is for the reconciler to judge, since closing a PR does not need one.
    pub fn from_artifact_dir(
        dir: &Path,
        preview_root: &str,
        html_dir: &str,
    ) -> Result<Self, RequestError> {
        info!(artifact_dir = %dir.display(), "Reading reconciliation request from artifact");

        let raw_pr = read_fact(dir, "pr.txt")?;
        let pr_number = match raw_pr.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                error!(raw = %raw_pr, "pr.txt does not hold a positive integer");
                return Err(RequestError::InvalidPrNumber(raw_pr));
            }
        };

        let raw_merged = read_fact(dir, "merged.txt")?;
        let merged = match raw_merged.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                error!(raw = %raw_merged, "merged.txt is neither true nor false");
                return Err(RequestError::InvalidMerged(raw_merged));
            }
        };

        let action = PrAction::parse(&read_fact(dir, "action.txt")?);

        let html = dir.join(html_dir);
        let artifact_path = if html.is_dir() {
            Some(html)
        } else {
            debug!(path = %html.display(), "No HTML directory in artifact");
            None
        };

        let request = ReconciliationRequest {
            pr_number,
            merged,
            action,
            preview_root: preview_root.to_string(),
            artifact_path,
        };
        info!(
            pr_number = request.pr_number,
            merged = request.merged,
            action = %request.action,
            has_artifact = request.artifact_path.is_some(),
            "Reconciliation request loaded"
        );
        Ok(request)
    }
}

fn read_fact(dir: &Path, name: &str) -> Result<String, RequestError> {
    let file = dir.join(name);
    match fs::read_to_string(&file) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(source) => {
            error!(error = ?source, file = %file.display(), "Failed to read artifact fact file");
            Err(RequestError::Read { file, source })
        }
    }
}
