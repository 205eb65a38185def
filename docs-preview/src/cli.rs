//! This module implements the CLI interface for docs-preview: command parsing,
//! the end-to-end [`preview`] pipeline, and the async [`run`] entrypoint.
//!
//! The decision logic lives in the [`docs-preview-core`] crate. This module only
//! gathers the facts (Pages site, artifact, worktree) and hands them over.
//!
//! ## How To Use
//! - In CI: `docs-preview reconcile --config preview.yaml --run-id $RUN_ID`
//! - Locally: `docs-preview reconcile --config preview.yaml --artifact-dir ./artifact`
//! - Programmatically: call [`run`] with a constructed [`Cli`], or [`preview`]
//!   with your own collaborators.
//!
//! [`docs-preview-core`]: ../../docs-preview-core/

use crate::git::GitWorktree;
use crate::github::GitHubClient;
use crate::load_config::{load_config, PreviewConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docs_preview_core::contract::{ArtifactSource, CommentThread, PagesLookup};
use docs_preview_core::reconcile::{ensure_artifact, reconcile, ReconcileReport};
use docs_preview_core::request::ReconciliationRequest;
use docs_preview_core::store::FsPreviewStore;
use std::path::PathBuf;

/// CLI for docs-preview: publish and retire pull-request documentation previews.
#[derive(Parser)]
#[clap(
    name = "docs-preview",
    version,
    about = "Publish, refresh and retire pull-request documentation previews on GitHub Pages"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the preview directory and comment of one pull request
    Reconcile {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Already downloaded artifact directory (holding pr.txt, merged.txt, action.txt)
        #[clap(long, conflicts_with = "run_id", required_unless_present = "run_id")]
        artifact_dir: Option<PathBuf>,
        /// Workflow run whose artifact should be downloaded
        #[clap(long)]
        run_id: Option<u64>,
    },
}

/// Where the build artifact comes from.
#[derive(Debug, Clone)]
pub enum ArtifactLocation {
    Local(PathBuf),
    Run(u64),
}

/// Runs the whole preview pipeline for one event.
///
/// Returns `Ok(None)` when the run was skipped: no Pages site, or a
/// collaborator needed before reconciliation failed. Only unreadable artifact
/// facts and a missing HTML build for an open PR are errors, and the latter is
/// checked before the Pages site or the git checkout can skip the run.
pub async fn preview<L, A, C>(
    config: &PreviewConfig,
    pages: &L,
    artifacts: &A,
    comments: &C,
    location: ArtifactLocation,
) -> Result<Option<ReconcileReport>>
where
    L: PagesLookup + ?Sized,
    A: ArtifactSource + ?Sized,
    C: CommentThread + ?Sized,
{
    // --- Step 1: Pages site (a failed lookup is reported after the artifact check) ---
    let site = match pages.pages_site(&config.repository).await {
        Ok(Some(site)) => Some(site),
        Ok(None) => {
            tracing::info!(
                repository = %config.repository,
                "[PREVIEW] Pages not configured, skipping"
            );
            return Ok(None);
        }
        Err(e) => {
            tracing::error!(error = %e, "[PREVIEW][ERROR] Pages lookup failed");
            None
        }
    };

    // --- Step 2: Artifact and request facts ---
    // Held until the end so a downloaded artifact outlives the reconciliation.
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let artifact_dir = match location {
        ArtifactLocation::Local(dir) => dir,
        ArtifactLocation::Run(run_id) => match artifacts.fetch(run_id, scratch.path()).await {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    run_id,
                    "[PREVIEW][ERROR] Artifact download failed, skipping"
                );
                return Ok(None);
            }
        },
    };

    let request = ReconciliationRequest::from_artifact_dir(
        &artifact_dir,
        &config.preview_root,
        &config.html_dir,
    )
    .with_context(|| format!("Invalid artifact at {}", artifact_dir.display()))?;
    ensure_artifact(&request)?;

    let Some(site) = site else {
        tracing::warn!(pr_number = request.pr_number, "[PREVIEW] No Pages site, skipping");
        return Ok(None);
    };

    // --- Step 3: Worktree and reconciliation ---
    let worktree = match GitWorktree::checkout(
        &config.push_url(),
        &site.branch,
        &config.workdir,
        &config.git,
    ) {
        Ok(worktree) => worktree,
        Err(e) => {
            tracing::error!(
                error = %e,
                branch = %site.branch,
                "[PREVIEW][ERROR] Checkout failed, skipping"
            );
            return Ok(None);
        }
    };
    let store = FsPreviewStore::new(worktree.dir());

    let report = reconcile(&request, &site, &store, &worktree, comments).await?;
    Ok(Some(report))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Reconcile {
            config,
            artifact_dir,
            run_id,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "reconcile", "Starting preview reconciliation");
            let github = GitHubClient::new(&config)?;
            let location = match (artifact_dir, run_id) {
                (Some(dir), _) => ArtifactLocation::Local(dir),
                (None, Some(run_id)) => ArtifactLocation::Run(run_id),
                (None, None) => anyhow::bail!("Either --artifact-dir or --run-id is required"),
            };

            match preview(&config, &github, &github, &github, location).await {
                Ok(Some(report)) => {
                    tracing::info!(command = "reconcile", ?report, "Reconciliation complete");
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Ok(None) => {
                    println!("Preview skipped.");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "reconcile", error = %e, "Reconciliation failed");
                    Err(e)
                }
            }
        }
    }
}
