//! `load_config` module: loads the static YAML config and injects secrets from the environment.
//!
//! This is the only place where the YAML file is parsed and mapped to the typed
//! [`PreviewConfig`] used by the rest of the CLI.
//!
//! # Responsibilities
//! - Parse the YAML file, filling unspecified keys with defaults
//! - Take the API token from `GITHUB_TOKEN` (never from the file)
//! - Let `GITHUB_REPOSITORY` (set by the hosting CI) override `repository`
//!
//! # Errors
//! All errors use `anyhow::Error` and surface at the CLI boundary.
//!
//! Example file:
//!
//! ```yaml
//! repository: NVIDIA-Merlin/dataloader
//! preview_root: review
//! html_dir: html
//! artifact_name: html-build-artifact
//! workdir: ./.docs-preview/worktree
//! git:
//!   user_name: github-actions[bot]
//!   user_email: 41898282+github-actions[bot]@users.noreply.github.com
//! ```

use anyhow::Result;
use docs_preview_core::request::{DEFAULT_HTML_DIR, DEFAULT_PREVIEW_ROOT};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_ARTIFACT_NAME: &str = "html-build-artifact";

#[derive(Debug, Clone, Deserialize)]
pub struct GitIdentity {
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_user_email")]
    pub user_email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            user_email: default_user_email(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    repository: Option<String>,
    #[serde(default = "default_preview_root")]
    preview_root: String,
    #[serde(default = "default_html_dir")]
    html_dir: String,
    #[serde(default = "default_artifact_name")]
    artifact_name: String,
    #[serde(default = "default_workdir")]
    workdir: PathBuf,
    #[serde(default = "default_api_url")]
    api_url: String,
    /// Clone URL of the Pages branch; derived from `repository` when absent.
    #[serde(default)]
    remote_url: Option<String>,
    #[serde(default)]
    git: GitIdentity,
}

/// Fully merged configuration (file + environment).
#[derive(Clone)]
pub struct PreviewConfig {
    /// `owner/name`.
    pub repository: String,
    pub preview_root: String,
    pub html_dir: String,
    pub artifact_name: String,
    pub workdir: PathBuf,
    pub api_url: String,
    pub remote_url: Option<String>,
    pub git: GitIdentity,
    pub token: String,
}

impl PreviewConfig {
    /// Clone URL of the repository with the token embedded for pushing.
    pub fn push_url(&self) -> String {
        match &self.remote_url {
            Some(url) => url.clone(),
            None => format!(
                "https://x-access-token:{}@github.com/{}.git",
                self.token, self.repository
            ),
        }
    }
}

impl std::fmt::Debug for PreviewConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewConfig")
            .field("repository", &self.repository)
            .field("preview_root", &self.preview_root)
            .field("html_dir", &self.html_dir)
            .field("artifact_name", &self.artifact_name)
            .field("workdir", &self.workdir)
            .field("api_url", &self.api_url)
            .field("remote_url", &self.remote_url.as_ref().map(|_| "<set>"))
            .field("git", &self.git)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PreviewConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let token = match std::env::var("GITHUB_TOKEN") {
        Ok(token) if !token.is_empty() => {
            info!("GITHUB_TOKEN found in env");
            token
        }
        _ => {
            error!("GITHUB_TOKEN environment variable not set");
            anyhow::bail!("GITHUB_TOKEN environment variable not set");
        }
    };

    let repository = match std::env::var("GITHUB_REPOSITORY").ok().or(raw.repository) {
        Some(repo) if repo.split('/').count() == 2 => repo,
        Some(repo) => {
            error!(repository = %repo, "Repository must be given as owner/name");
            anyhow::bail!("Repository must be given as owner/name, got {repo:?}");
        }
        None => {
            error!("No repository in config and GITHUB_REPOSITORY not set");
            anyhow::bail!("No repository configured: set `repository` or GITHUB_REPOSITORY");
        }
    };

    let config = PreviewConfig {
        repository,
        preview_root: raw.preview_root,
        html_dir: raw.html_dir,
        artifact_name: raw.artifact_name,
        workdir: raw.workdir,
        api_url: raw.api_url.trim_end_matches('/').to_string(),
        remote_url: raw.remote_url,
        git: raw.git,
        token,
    };
    info!(
        repository = %config.repository,
        preview_root = %config.preview_root,
        workdir = %config.workdir.display(),
        "Config loaded and merged successfully"
    );
    Ok(config)
}

fn default_preview_root() -> String {
    DEFAULT_PREVIEW_ROOT.to_string()
}

fn default_html_dir() -> String {
    DEFAULT_HTML_DIR.to_string()
}

fn default_artifact_name() -> String {
    DEFAULT_ARTIFACT_NAME.to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".docs-preview/worktree")
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_user_name() -> String {
    "github-actions[bot]".to_string()
}

fn default_user_email() -> String {
    "41898282+github-actions[bot]@users.noreply.github.com".to_string()
}
