//! Source fetching with git

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deploy::process::{CommandSpec, ProcessRunner};
use crate::deploy::sink::LogSink;
use crate::errors::DeployerError;

/// Clones a single branch of a repository and resolves its HEAD
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    git_bin: String,
    runner: ProcessRunner,
}

impl SourceFetcher {
    pub fn new(git_bin: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            git_bin: git_bin.into(),
            runner,
        }
    }

    /// Shallow clone `branch` of `repo_url` into `dest`, returning the commit hash
    pub async fn fetch(
        &self,
        repo_url: &str,
        branch: &str,
        dest: &Path,
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<String, DeployerError> {
        info!("Cloning {} (branch: {})", repo_url, branch);
        self.clone_branch(repo_url, branch, dest, sink, cancel).await?;
        let commit = self.resolve_head(dest, cancel).await?;
        debug!("Checked out {} at {}", repo_url, commit);
        Ok(commit)
    }

    async fn clone_branch(
        &self,
        repo_url: &str,
        branch: &str,
        dest: &Path,
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<(), DeployerError> {
        let spec = CommandSpec::new(&self.git_bin)
            .args(["clone", "--depth", "1", "--single-branch", "--branch", branch, "--"])
            .arg(repo_url)
            .arg(dest.to_string_lossy())
            .env("GIT_TERMINAL_PROMPT", "0");

        self.runner
            .stream(&spec, sink, cancel)
            .await
            .map_err(|e| match e {
                DeployerError::ProcessFailed { code, message, .. } => {
                    DeployerError::CloneFailed { code, message }
                }
                other => other,
            })
    }

    async fn resolve_head(
        &self,
        repo_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, DeployerError> {
        let spec = CommandSpec::new(&self.git_bin)
            .args(["rev-parse", "HEAD"])
            .current_dir(repo_dir);

        let output = self
            .runner
            .output(&spec, Some(cancel))
            .await
            .map_err(|e| match e {
                DeployerError::ProcessFailed { message, .. } => {
                    DeployerError::CommitResolutionFailed(message)
                }
                other => other,
            })?;

        let commit = output.trim();
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeployerError::CommitResolutionFailed(format!(
                "unexpected rev-parse output {:?}",
                commit
            )));
        }
        Ok(commit.to_string())
    }
}
