//! Git plumbing for the Pages branch: check it out, commit, force-push.
//!
//! Concurrent runs for the same PR are not coordinated; the push is forced,
//! so the last run to push wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use async_trait::async_trait;
use docs_preview_core::contract::{PublishOutcome, Publisher};
use docs_preview_core::error::CollaboratorError;

use crate::load_config::GitIdentity;

/// A shallow clone of the Pages branch.
pub struct GitWorktree {
    dir: PathBuf,
    branch: String,
}

impl GitWorktree {
    /// Clones `branch` of `remote` into `dir`, replacing whatever was there.
    pub fn checkout(
        remote: &str,
        branch: &str,
        dir: &Path,
        identity: &GitIdentity,
    ) -> Result<Self, CollaboratorError> {
        if dir.exists() {
            ensure_disposable(dir)?;
            fs::remove_dir_all(dir).map_err(|e| {
                tracing::error!(
                    error = ?e,
                    path = %dir.display(),
                    "Failed to remove stale worktree"
                );
                CollaboratorError::io("remove stale worktree", e)
            })?;
            tracing::debug!(path = %dir.display(), "Removed stale worktree");
        }
        if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CollaboratorError::io("create workdir", e))?;
        }

        // The remote may embed a token, so it is never logged.
        run_git(
            Command::new("git")
                .arg("clone")
                .arg("--depth")
                .arg("1")
                .arg("--branch")
                .arg(branch)
                .arg(remote)
                .arg(dir),
            "git clone",
        )?;
        tracing::info!(branch, path = %dir.display(), "Checked out Pages branch");

        let worktree = Self {
            dir: dir.to_path_buf(),
            branch: branch.to_string(),
        };
        worktree.git(&["config", "user.name", &identity.user_name], "git config")?;
        worktree.git(&["config", "user.email", &identity.user_email], "git config")?;

        // Pages would otherwise run Jekyll and drop `_static/` and friends.
        let nojekyll = worktree.dir.join(".nojekyll");
        if !nojekyll.exists() {
            fs::write(&nojekyll, b"").map_err(|e| CollaboratorError::io("write .nojekyll", e))?;
            tracing::debug!(path = %nojekyll.display(), "Created .nojekyll");
        }
        Ok(worktree)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn git(&self, args: &[&str], operation: &'static str) -> Result<Output, CollaboratorError> {
        run_git(Command::new("git").arg("-C").arg(&self.dir).args(args), operation)
    }
}

#[async_trait]
impl Publisher for GitWorktree {
    async fn publish(&self, message: &str) -> Result<PublishOutcome, CollaboratorError> {
        self.git(&["add", "--all"], "git add")?;

        let status = self.git(&["status", "--porcelain"], "git status")?;
        if status.stdout.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(path = %self.dir.display(), "Nothing to commit");
            return Ok(PublishOutcome::NothingToCommit);
        }

        self.git(&["commit", "--quiet", "-m", message], "git commit")?;
        let refspec = format!("HEAD:{}", self.branch);
        self.git(&["push", "--force", "origin", &refspec], "git push")?;
        tracing::info!(branch = %self.branch, message, "Pushed preview branch");
        Ok(PublishOutcome::Pushed)
    }
}

/// Only an empty directory or a previous git clone may be wiped before checkout.
fn ensure_disposable(dir: &Path) -> Result<(), CollaboratorError> {
    const OP: &str = "prepare worktree";
    if dir.join(".git").exists() {
        return Ok(());
    }
    let mut entries = fs::read_dir(dir).map_err(|e| CollaboratorError::io(OP, e))?;
    if entries.next().is_none() {
        return Ok(());
    }
    tracing::error!(path = %dir.display(), "Workdir holds files but is not a git clone");
    Err(CollaboratorError::call(
        OP,
        format!("{} is not empty and not a git clone, refusing to delete it", dir.display()),
    ))
}

fn run_git(cmd: &mut Command, operation: &'static str) -> Result<Output, CollaboratorError> {
    match cmd.output() {
        Ok(out) if out.status.success() => {
            tracing::debug!(operation, status = ?out.status, "git succeeded");
            Ok(out)
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            tracing::error!(
                operation,
                status = ?out.status,
                stderr = %stderr,
                "git exited with non-zero code"
            );
            Err(CollaboratorError::call(operation, format!("{}: {stderr}", out.status)))
        }
        Err(e) => {
            tracing::error!(error = ?e, operation, "Failed to launch git process");
            Err(CollaboratorError::io(operation, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_REMOTE: &str = "/nonexistent/docs-preview-remote.git";

    #[test]
    fn refuses_to_wipe_a_directory_that_is_not_a_clone() {
        let workdir = tempfile::tempdir().unwrap();
        fs::write(workdir.path().join("Cargo.toml"), "[package]").unwrap();

        let identity = GitIdentity::default();
        let err = GitWorktree::checkout(NO_REMOTE, "gh-pages", workdir.path(), &identity)
            .err()
            .expect("non-empty non-clone workdir must be rejected");

        assert!(err.to_string().contains("refusing to delete"), "got: {err}");
        assert!(workdir.path().join("Cargo.toml").exists());
    }

    #[test]
    fn replaces_a_stale_clone() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("worktree");
        fs::create_dir_all(stale.join(".git")).unwrap();
        fs::write(stale.join("old.html"), "stale").unwrap();

        // The clone itself fails, but only after the stale tree is gone.
        let identity = GitIdentity::default();
        assert!(GitWorktree::checkout(NO_REMOTE, "gh-pages", &stale, &identity).is_err());
        assert!(!stale.join("old.html").exists());
    }
}
