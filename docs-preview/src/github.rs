#![doc = "GitHub REST integration: implements the core collaborator traits against api.github.com."]
//
//! # GitHub client (CLI <-> Core)
//!
//! [`GitHubClient`] wires the [`PagesLookup`], [`CommentThread`] and
//! [`ArtifactSource`] traits from `docs-preview-core::contract` to the GitHub
//! REST API using `reqwest`.
//!
//! - Construct it from a loaded [`PreviewConfig`] (token, repository, API URL).
//! - Every non-2xx answer becomes a [`CollaboratorError`] carrying status and body;
//!   the reconciler decides whether that is fatal.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docs_preview_core::contract::{ArtifactSource, CommentThread, PagesLookup, PagesSite};
use docs_preview_core::error::CollaboratorError;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::load_config::PreviewConfig;

const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct PagesResponse {
    html_url: String,
    #[serde(default)]
    source: Option<PagesSource>,
}

#[derive(Debug, Deserialize)]
struct PagesSource {
    branch: String,
}

#[derive(Debug, Deserialize)]
struct IssueComment {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactList {
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    name: String,
    archive_download_url: String,
    #[serde(default)]
    expired: bool,
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    repository: String,
    artifact_name: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &PreviewConfig) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CollaboratorError::call("build http client", e.to_string()))?;
        tracing::info!(
            api_url = %config.api_url,
            repository = %config.repository,
            "Initialized GitHubClient"
        );
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            repository: config.repository.clone(),
            artifact_name: config.artifact_name.clone(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "docs-preview")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<Response, CollaboratorError> {
        let resp = builder.send().await.map_err(|e| {
            tracing::error!(error = ?e, operation, "GitHub request failed to send");
            CollaboratorError::call(operation, e.to_string())
        })?;
        Ok(resp)
    }

    async fn expect_success(
        resp: Response,
        operation: &'static str,
    ) -> Result<Response, CollaboratorError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp
            .text()
            .await
            .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
        tracing::error!(%status, operation, "GitHub API returned error. Response body: {text}");
        Err(CollaboratorError::call(operation, format!("{status}: {text}")))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        resp: Response,
        operation: &'static str,
    ) -> Result<T, CollaboratorError> {
        resp.json::<T>()
            .await
            .map_err(|e| CollaboratorError::call(operation, format!("invalid response: {e}")))
    }
}

#[async_trait]
impl PagesLookup for GitHubClient {
    async fn pages_site(&self, repo: &str) -> Result<Option<PagesSite>, CollaboratorError> {
        const OP: &str = "pages lookup";
        let url = format!("{}/repos/{}/pages", self.api_url, repo);
        tracing::info!(url = %url, "Fetching Pages configuration");

        let resp = self.send(self.request(Method::GET, &url), OP).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::info!(repo, "Repository has no Pages site");
            return Ok(None);
        }
        let pages: PagesResponse = Self::json(Self::expect_success(resp, OP).await?, OP).await?;

        match pages.source {
            Some(source) => {
                tracing::info!(url = %pages.html_url, branch = %source.branch, "Pages site found");
                Ok(Some(PagesSite {
                    url: pages.html_url,
                    branch: source.branch,
                }))
            }
            None => {
                tracing::warn!(url = %pages.html_url, "Pages site is not deployed from a branch");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CommentThread for GitHubClient {
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<String>, CollaboratorError> {
        const OP: &str = "list comments";
        let mut bodies = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/repos/{}/issues/{}/comments?per_page={}&page={}",
                self.api_url, self.repository, pr_number, PER_PAGE, page
            );
            let resp = self.send(self.request(Method::GET, &url), OP).await?;
            let comments: Vec<IssueComment> =
                Self::json(Self::expect_success(resp, OP).await?, OP).await?;
            let count = comments.len();
            bodies.extend(comments.into_iter().filter_map(|c| c.body));
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        tracing::info!(pr_number, count = bodies.len(), "Listed PR comments");
        Ok(bodies)
    }

    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<(), CollaboratorError> {
        const OP: &str = "create comment";
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url, self.repository, pr_number
        );
        let resp = self
            .send(
                self.request(Method::POST, &url)
                    .json(&serde_json::json!({ "body": body })),
                OP,
            )
            .await?;
        Self::expect_success(resp, OP).await?;
        tracing::info!(pr_number, "Created PR comment");
        Ok(())
    }
}

#[async_trait]
impl ArtifactSource for GitHubClient {
    async fn fetch(&self, run_id: u64, dest: &Path) -> Result<PathBuf, CollaboratorError> {
        const OP: &str = "artifact download";
        let url = format!(
            "{}/repos/{}/actions/runs/{}/artifacts?per_page={}",
            self.api_url, self.repository, run_id, PER_PAGE
        );
        let resp = self.send(self.request(Method::GET, &url), OP).await?;
        let list: ArtifactList = Self::json(Self::expect_success(resp, OP).await?, OP).await?;

        let artifact = list
            .artifacts
            .into_iter()
            .find(|a| a.name == self.artifact_name && !a.expired)
            .ok_or_else(|| {
                tracing::error!(
                    run_id,
                    name = %self.artifact_name,
                    "Artifact not found in workflow run"
                );
                CollaboratorError::call(OP, format!("no artifact named {:?}", self.artifact_name))
            })?;

        tracing::info!(run_id, name = %artifact.name, "Downloading workflow artifact");
        let resp = self
            .send(self.request(Method::GET, &artifact.archive_download_url), OP)
            .await?;
        let bytes = Self::expect_success(resp, OP)
            .await?
            .bytes()
            .await
            .map_err(|e| CollaboratorError::call(OP, e.to_string()))?;

        extract_zip(&bytes, dest)?;
        tracing::info!(run_id, dest = %dest.display(), size = bytes.len(), "Extracted artifact");
        Ok(dest.to_path_buf())
    }
}

/// Unpacks a zip archive into `dest`, skipping entries that would escape it.
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), CollaboratorError> {
    const OP: &str = "artifact extract";
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CollaboratorError::call(OP, e.to_string()))?;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| CollaboratorError::call(OP, e.to_string()))?;
        let Some(rel) = file.enclosed_name() else {
            tracing::warn!(name = file.name(), "Skipping unsafe zip entry");
            continue;
        };
        let out = dest.join(rel);
        if file.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| CollaboratorError::io(OP, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CollaboratorError::io(OP, e))?;
        }
        let mut target = std::fs::File::create(&out).map_err(|e| CollaboratorError::io(OP, e))?;
        std::io::copy(&mut file, &mut target).map_err(|e| CollaboratorError::io(OP, e))?;
    }
    Ok(())
}
