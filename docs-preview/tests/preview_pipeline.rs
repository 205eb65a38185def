use std::fs;
use std::path::Path;
use std::process::Command;

use docs_preview::cli::{preview, ArtifactLocation};
use docs_preview::load_config::{GitIdentity, PreviewConfig};
use docs_preview_core::contract::{
    MockArtifactSource, MockCommentThread, MockPagesLookup, PagesSite, PublishOutcome,
};
use docs_preview_core::error::{CollaboratorError, ReconcileError};
use docs_preview_core::reconcile::{CommentOutcome, MutationOutcome, PublishReport};
use tempfile::TempDir;

const BRANCH: &str = "gh-pages";

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=seed", "-c", "user.email=seed@example.org"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .output()
        .expect("git must be installed");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}

/// Bare remote with a `gh-pages` branch holding the published site.
fn setup_remote(tmp: &TempDir) -> String {
    let remote = tmp.path().join("remote.git");
    let seed = tmp.path().join("seed");
    fs::create_dir_all(&remote).unwrap();
    fs::create_dir_all(&seed).unwrap();
    git(&remote, &["init", "--bare", "--quiet"]);
    git(&seed, &["init", "--quiet"]);
    git(&seed, &["checkout", "--quiet", "-b", BRANCH]);
    fs::write(seed.join("index.html"), "main docs").unwrap();
    git(&seed, &["add", "--all"]);
    git(&seed, &["commit", "--quiet", "-m", "Initial site"]);
    git(&seed, &["push", "--quiet", remote.to_str().unwrap(), BRANCH]);
    remote.to_string_lossy().into_owned()
}

fn clone_branch(tmp: &TempDir, remote: &str, name: &str) -> std::path::PathBuf {
    let dest = tmp.path().join(name);
    let out = Command::new("git")
        .args(["clone", "--quiet", "--branch", BRANCH, remote])
        .arg(&dest)
        .output()
        .expect("git must be installed");
    assert!(out.status.success());
    dest
}

fn config(tmp: &TempDir, remote: Option<String>) -> PreviewConfig {
    PreviewConfig {
        repository: "NVIDIA-Merlin/dataloader".to_string(),
        preview_root: "review".to_string(),
        html_dir: "html".to_string(),
        artifact_name: "html-build-artifact".to_string(),
        workdir: tmp.path().join("worktree"),
        api_url: "http://127.0.0.1:9".to_string(),
        remote_url: remote,
        git: GitIdentity::default(),
        token: "unused".to_string(),
    }
}

fn write_artifact(dir: &Path, pr: u64, merged: bool, action: &str, with_html: bool) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("pr.txt"), pr.to_string()).unwrap();
    fs::write(dir.join("merged.txt"), merged.to_string()).unwrap();
    fs::write(dir.join("action.txt"), action).unwrap();
    if with_html {
        fs::create_dir_all(dir.join("html")).unwrap();
        fs::write(dir.join("html/index.html"), format!("preview of #{pr}")).unwrap();
    }
}

fn pages_found() -> MockPagesLookup {
    let mut pages = MockPagesLookup::new();
    pages.expect_pages_site().returning(|_| {
        Ok(Some(PagesSite {
            url: "https://nvidia-merlin.github.io/dataloader/".to_string(),
            branch: BRANCH.to_string(),
        }))
    });
    pages
}

#[tokio::test]
async fn pages_not_configured_skips_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pages = MockPagesLookup::new();
    pages
        .expect_pages_site()
        .withf(|repo| repo.to_string() == "NVIDIA-Merlin/dataloader")
        .times(1)
        .returning(|_| Ok(None));
    let mut artifacts = MockArtifactSource::new();
    artifacts.expect_fetch().never();
    let mut comments = MockCommentThread::new();
    comments.expect_list_comments().never();

    let cfg = config(&tmp, None);
    let outcome = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Run(99))
        .await
        .expect("skip is not an error");
    assert!(outcome.is_none());
}

#[tokio::test]
async fn failing_collaborators_before_reconcile_skip_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(&tmp, None);
    let built = tmp.path().join("artifact-built");
    write_artifact(&built, 1, false, "opened", true);
    let comments = MockCommentThread::new();

    let mut pages = MockPagesLookup::new();
    pages
        .expect_pages_site()
        .times(1)
        .returning(|_| Err(CollaboratorError::call("pages lookup", "500")));
    let mut artifacts = MockArtifactSource::new();
    let fetched = built.clone();
    artifacts
        .expect_fetch()
        .times(1)
        .returning(move |_, _| Ok(fetched.clone()));
    let outcome = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Run(1))
        .await
        .unwrap();
    assert!(outcome.is_none());

    let pages = pages_found();
    let mut artifacts = MockArtifactSource::new();
    artifacts
        .expect_fetch()
        .times(1)
        .returning(|_, _| Err(CollaboratorError::call("artifact download", "expired")));
    let outcome = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Run(1))
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn missing_html_fails_even_when_pages_lookup_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pages = MockPagesLookup::new();
    pages
        .expect_pages_site()
        .times(1)
        .returning(|_| Err(CollaboratorError::call("pages lookup", "503")));
    let artifacts = MockArtifactSource::new();
    let mut comments = MockCommentThread::new();
    comments.expect_create_comment().never();

    let broken = tmp.path().join("artifact-broken");
    write_artifact(&broken, 15, false, "opened", false);

    let cfg = config(&tmp, None);
    let err = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(broken))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReconcileError>(),
        Some(ReconcileError::MissingArtifact { pr_number: 15, .. })
    ));
}

#[tokio::test]
async fn missing_html_fails_even_when_checkout_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let missing_remote = tmp.path().join("no-such-remote.git");
    let cfg = config(&tmp, Some(missing_remote.to_string_lossy().into_owned()));
    let pages = pages_found();
    let artifacts = MockArtifactSource::new();
    let mut comments = MockCommentThread::new();
    comments.expect_create_comment().never();

    let broken = tmp.path().join("artifact-broken");
    write_artifact(&broken, 16, false, "opened", false);

    let err = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(broken))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReconcileError>(),
        Some(ReconcileError::MissingArtifact { pr_number: 16, .. })
    ));
    assert!(!tmp.path().join("worktree").exists(), "no checkout was attempted");
}

#[tokio::test]
async fn checkout_failure_skips_a_healthy_build() {
    let tmp = tempfile::tempdir().unwrap();
    let missing_remote = tmp.path().join("no-such-remote.git");
    let cfg = config(&tmp, Some(missing_remote.to_string_lossy().into_owned()));
    let pages = pages_found();
    let artifacts = MockArtifactSource::new();
    let mut comments = MockCommentThread::new();
    comments.expect_list_comments().never();

    let built = tmp.path().join("artifact-built");
    write_artifact(&built, 17, false, "opened", true);

    let outcome = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(built))
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn unreadable_artifact_facts_are_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let pages = pages_found();
    let mut artifacts = MockArtifactSource::new();
    artifacts
        .expect_fetch()
        .times(1)
        .returning(|_, dest| Ok(dest.to_path_buf()));
    let comments = MockCommentThread::new();

    let cfg = config(&tmp, None);
    let err = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Run(5))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid artifact"), "got: {err}");
}

#[tokio::test]
async fn open_then_close_publishes_and_retires_preview() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = setup_remote(&tmp);
    let cfg = config(&tmp, Some(remote.clone()));
    let pages = pages_found();
    let artifacts = MockArtifactSource::new();

    // --- PR opened ---
    let mut comments = MockCommentThread::new();
    comments.expect_list_comments().times(1).returning(|_| Ok(vec![]));
    comments
        .expect_create_comment()
        .withf(|pr, body| *pr == 12 && body.contains("review/pr-12/"))
        .times(1)
        .returning(|_, _| Ok(()));
    let opened = tmp.path().join("artifact-opened");
    write_artifact(&opened, 12, false, "opened", true);

    let report = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(opened))
        .await
        .unwrap()
        .expect("reconciled");
    assert_eq!(report.mutation, MutationOutcome::Replaced { replaced_existing: false });
    assert_eq!(report.publish, PublishReport::Done(PublishOutcome::Pushed));
    assert!(matches!(report.comment, CommentOutcome::Posted { .. }));

    let published = clone_branch(&tmp, &remote, "check-opened");
    assert_eq!(
        fs::read_to_string(published.join("review/pr-12/index.html")).unwrap(),
        "preview of #12"
    );
    assert!(published.join(".nojekyll").exists());
    assert!(published.join("index.html").exists(), "main site is kept");

    // --- PR closed after merge ---
    let mut comments = MockCommentThread::new();
    comments.expect_list_comments().never();
    comments.expect_create_comment().never();
    let closed = tmp.path().join("artifact-closed");
    write_artifact(&closed, 12, true, "closed", false);

    let report = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(closed))
        .await
        .unwrap()
        .expect("reconciled");
    assert_eq!(report.mutation, MutationOutcome::Removed { existed: true });

    let retired = clone_branch(&tmp, &remote, "check-closed");
    assert!(!retired.join("review/pr-12").exists());
    assert!(retired.join("index.html").exists());
}

#[tokio::test]
async fn opened_pr_without_html_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = setup_remote(&tmp);
    let cfg = config(&tmp, Some(remote));
    let pages = pages_found();
    let artifacts = MockArtifactSource::new();
    let mut comments = MockCommentThread::new();
    comments.expect_create_comment().never();

    let broken = tmp.path().join("artifact-broken");
    write_artifact(&broken, 7, false, "synchronize", false);

    let err = preview(&cfg, &pages, &artifacts, &comments, ArtifactLocation::Local(broken))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReconcileError>(),
        Some(ReconcileError::MissingArtifact { pr_number: 7, .. })
    ));
}
