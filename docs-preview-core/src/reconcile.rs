//! Preview reconciler: brings one PR's preview directory and comment in line with its lifecycle.
//!
//! For a given [`ReconciliationRequest`] the reconciler:
//!   - decides on exactly one directory mutation ([`decide`]),
//!   - applies it to a [`PreviewStore`] and publishes the result through a [`Publisher`],
//!   - posts the preview-link comment once per PR through a [`CommentThread`].
//!
//! # Error Handling
//! Store, publish and comment failures are logged and recorded in the
//! [`ReconcileReport`]; later steps still run. The only hard error is
//! [`ReconcileError::MissingArtifact`]: an open or updated PR whose build
//! produced no HTML. In that case nothing is published and no comment is posted.
//!
//! # State
//! There is none. Existing previews are read from the store and existing
//! comments are listed fresh on every call.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::comment::{already_posted, comment_body, preview_url};
use crate::contract::{CommentThread, PagesSite, PreviewStore, PublishOutcome, Publisher};
use crate::error::ReconcileError;
use crate::request::{PrAction, ReconciliationRequest};

/// The directory mutation chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Delete the preview and any artifact left behind.
    Remove,
    /// Replace the preview with the freshly built artifact.
    Replace,
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Open/update event for a PR that is already merged.
    MergedBuild,
    /// Event that neither publishes nor retires a preview.
    UnhandledAction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MutationOutcome {
    Removed { existed: bool },
    Replaced { replaced_existing: bool },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PublishReport {
    NotAttempted,
    Done(PublishOutcome),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommentOutcome {
    Posted { url: String },
    AlreadyPosted,
    NotEligible,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub pr_number: u64,
    pub preview_path: String,
    pub mutation: MutationOutcome,
    pub publish: PublishReport,
    pub comment: CommentOutcome,
}

/// First matching row wins: closed, then open/update by merge state, then everything else.
pub fn decide(request: &ReconciliationRequest) -> Mutation {
    match (&request.action, request.merged) {
        (PrAction::Closed, _) => Mutation::Remove,
        (action, false) if action.is_update() => Mutation::Replace,
        (action, true) if action.is_update() => Mutation::Skip(SkipReason::MergedBuild),
        (action, _) => Mutation::Skip(SkipReason::UnhandledAction(action.to_string())),
    }
}

pub fn commit_message(mutation: &Mutation, pr_number: u64) -> Option<String> {
    match mutation {
        Mutation::Replace => Some(format!("Documentation preview for PR #{pr_number}")),
        Mutation::Remove => Some(format!("Remove documentation preview for PR #{pr_number}")),
        Mutation::Skip(_) => None,
    }
}

pub async fn reconcile<S, P, C>(
    request: &ReconciliationRequest,
    site: &PagesSite,
    store: &S,
    publisher: &P,
    comments: &C,
) -> Result<ReconcileReport, ReconcileError>
where
    S: PreviewStore + ?Sized,
    P: Publisher + ?Sized,
    C: CommentThread + ?Sized,
{
    let preview_path = request.preview_path();
    let mutation = decide(request);
    info!(
        pr_number = request.pr_number,
        action = %request.action,
        merged = request.merged,
        preview_path = %preview_path,
        ?mutation,
        "[PREVIEW] Reconciling"
    );

    // --- Step 1: Mutate the preview directory ---
    let mutation_outcome = match &mutation {
        Mutation::Remove => remove_preview(request, store, &preview_path),
        Mutation::Replace => replace_preview(request, store, &preview_path)?,
        Mutation::Skip(reason) => {
            warn!(
                pr_number = request.pr_number,
                ?reason,
                "[PREVIEW] Nothing to do for this event"
            );
            MutationOutcome::Skipped(reason.clone())
        }
    };

    // --- Step 2: Commit and push ---
    let publish = match commit_message(&mutation, request.pr_number) {
        Some(message) => match publisher.publish(&message).await {
            Ok(outcome) => {
                info!(?outcome, "[PREVIEW] Publish finished");
                PublishReport::Done(outcome)
            }
            Err(e) => {
                error!(error = %e, "[PREVIEW][ERROR] Publish failed");
                PublishReport::Failed(e.to_string())
            }
        },
        None => PublishReport::NotAttempted,
    };

    // --- Step 3: Comment once per PR ---
    let mutated = matches!(
        mutation_outcome,
        MutationOutcome::Replaced { .. } | MutationOutcome::Removed { .. }
    );
    let eligible = !request.merged && mutated;
    let comment = if eligible {
        post_comment_once(request.pr_number, site, &preview_path, comments).await
    } else {
        debug!(pr_number = request.pr_number, "[PREVIEW] Comment not eligible");
        CommentOutcome::NotEligible
    };

    let report = ReconcileReport {
        pr_number: request.pr_number,
        preview_path,
        mutation: mutation_outcome,
        publish,
        comment,
    };
    info!(?report, "[PREVIEW] Reconciliation complete");
    Ok(report)
}

fn remove_preview<S>(
    request: &ReconciliationRequest,
    store: &S,
    preview_path: &str,
) -> MutationOutcome
where
    S: PreviewStore + ?Sized,
{
    if let Some(artifact) = request.artifact_path.as_deref().filter(|p| p.exists()) {
        match fs::remove_dir_all(artifact) {
            Ok(()) => debug!(
                path = %artifact.display(),
                "[PREVIEW] Discarded artifact of closed PR"
            ),
            Err(e) => warn!(
                error = ?e,
                path = %artifact.display(),
                "[PREVIEW] Failed to discard artifact"
            ),
        }
    }

    match store.delete(preview_path) {
        Ok(existed) => {
            info!(preview_path, existed, "[PREVIEW] Removed preview of closed PR");
            MutationOutcome::Removed { existed }
        }
        Err(e) => {
            error!(error = %e, preview_path, "[PREVIEW][ERROR] Failed to remove preview");
            MutationOutcome::Failed(e.to_string())
        }
    }
}

fn replace_preview<S>(
    request: &ReconciliationRequest,
    store: &S,
    preview_path: &str,
) -> Result<MutationOutcome, ReconcileError>
where
    S: PreviewStore + ?Sized,
{
    // Checked before touching the store so a failed build keeps the previous preview.
    let artifact = artifact_dir(request)?;

    let replaced_existing = match store.delete(preview_path) {
        Ok(existed) => existed,
        Err(e) => {
            error!(error = %e, preview_path, "[PREVIEW][ERROR] Failed to remove stale preview");
            return Ok(MutationOutcome::Failed(e.to_string()));
        }
    };

    match store.put(preview_path, artifact) {
        Ok(()) => {
            info!(preview_path, replaced_existing, "[PREVIEW] Preview updated");
            Ok(MutationOutcome::Replaced { replaced_existing })
        }
        Err(e) => {
            error!(error = %e, preview_path, "[PREVIEW][ERROR] Failed to store preview");
            Ok(MutationOutcome::Failed(e.to_string()))
        }
    }
}

/// Fails with [`ReconcileError::MissingArtifact`] when `request` would replace
/// its preview but the build produced no HTML.
///
/// The CLI runs this before checkout, so a broken build is reported even when
/// the Pages lookup or the git checkout fails.
pub fn ensure_artifact(request: &ReconciliationRequest) -> Result<(), ReconcileError> {
    match decide(request) {
        Mutation::Replace => artifact_dir(request).map(|_| ()),
        Mutation::Remove | Mutation::Skip(_) => Ok(()),
    }
}

fn artifact_dir(request: &ReconciliationRequest) -> Result<&Path, ReconcileError> {
    match request.artifact_path.as_deref() {
        Some(path) if path.is_dir() => Ok(path),
        other => {
            let expected = other
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            error!(
                pr_number = request.pr_number,
                %expected,
                "[PREVIEW][ERROR] Build artifact missing"
            );
            Err(ReconcileError::MissingArtifact {
                pr_number: request.pr_number,
                expected,
            })
        }
    }
}

async fn post_comment_once<C>(
    pr_number: u64,
    site: &PagesSite,
    preview_path: &str,
    comments: &C,
) -> CommentOutcome
where
    C: CommentThread + ?Sized,
{
    let existing = match comments.list_comments(pr_number).await {
        Ok(existing) => existing,
        Err(e) => {
            // Without the listing there is no way to deduplicate.
            error!(error = %e, pr_number, "[PREVIEW][ERROR] Failed to list comments");
            return CommentOutcome::Failed(e.to_string());
        }
    };
    if already_posted(existing.as_slice()) {
        info!(pr_number, "[PREVIEW] Preview comment already present");
        return CommentOutcome::AlreadyPosted;
    }

    let url = preview_url(&site.url, preview_path);
    match comments.create_comment(pr_number, &comment_body(&url)).await {
        Ok(()) => {
            info!(pr_number, url = %url, "[PREVIEW] Posted preview comment");
            CommentOutcome::Posted { url }
        }
        Err(e) => {
            error!(error = %e, pr_number, "[PREVIEW][ERROR] Failed to post comment");
            CommentOutcome::Failed(e.to_string())
        }
    }
}
