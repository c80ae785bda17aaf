// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration source fetching.
//!
//! ConfigMap synchronization needs "the files under `path` at `ref` of `repo`".
//! [`SourceFetcher`] is that seam; [`GitSourceFetcher`] implements it by shelling
//! out to `git` into a temporary directory that is removed once the files have been
//! read.
//!
//! The ref and path come from the `AppConfig` author. Refs starting with `-` are
//! rejected before `git` is spawned, and the config directory must resolve inside the
//! checkout after symlinks are followed.

use crate::constants::GIT_TIMEOUT_SECS;
use crate::errors::SourceError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Coordinates of a configuration tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    /// Repository URL
    pub repo: String,
    /// Branch, tag or commit. Empty means the remote default branch.
    pub git_ref: String,
    /// Directory inside the repository
    pub path: String,
}

/// One leaf file of a fetched tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// File name without directories
    pub file_name: String,
    /// UTF-8 file content
    pub content: String,
}

/// Fetch a configuration tree.
#[async_trait]
pub trait SourceFetcher: Send + Sync + 'static {
    /// Materialize every leaf file under `source.path`, recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be cloned, the ref cannot be
    /// checked out, or the tree cannot be read.
    async fn fetch(&self, source: &SourceRef) -> Result<Vec<SourceFile>, SourceError>;
}

/// [`SourceFetcher`] using the `git` command line client.
#[derive(Clone, Debug, Default)]
pub struct GitSourceFetcher;

impl GitSourceFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run_git(
        operation: &'static str,
        repo: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<(), SourceError> {
        let mut command = Command::new("git");
        if let Some(dir) = cwd {
            command.arg("-C").arg(dir);
        }
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(GIT_TIMEOUT_SECS), command.output())
            .await
            .map_err(|_| SourceError::Timeout {
                operation,
                secs: GIT_TIMEOUT_SECS,
            })?
            .map_err(|source| SourceError::Spawn { operation, source })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SourceError::Git {
                operation,
                repo: repo.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Clone `repo` at `git_ref` into `dest`.
    ///
    /// A shallow single-branch clone is tried first; commit SHAs and other refs
    /// `--branch` cannot resolve fall back to a full clone plus checkout.
    async fn checkout(repo: &str, git_ref: &str, dest: &Path) -> Result<(), SourceError> {
        let dest_str = dest.to_string_lossy().to_string();
        let dest_str = dest_str.as_str();

        if git_ref.is_empty() {
            return Self::run_git(
                "clone",
                repo,
                &["clone", "--quiet", "--depth", "1", "--", repo, dest_str],
                None,
            )
            .await;
        }

        let shallow = Self::run_git(
            "clone",
            repo,
            &["clone", "--quiet", "--depth", "1", "--branch", git_ref, "--", repo, dest_str],
            None,
        )
        .await;

        if shallow.is_ok() {
            return Ok(());
        }

        debug!(repo = %repo, git_ref = %git_ref, "Shallow clone failed, falling back to full clone");
        if dest.exists() {
            tokio::fs::remove_dir_all(dest).await?;
        }
        Self::run_git("clone", repo, &["clone", "--quiet", "--", repo, dest_str], None).await?;
        Self::run_git("checkout", repo, &["checkout", "--quiet", git_ref, "--"], Some(dest)).await
    }
}

#[async_trait]
impl SourceFetcher for GitSourceFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<Vec<SourceFile>, SourceError> {
        validate_ref(&source.git_ref)?;
        repository_relative(&source.path)?;

        let workdir = TempDir::new()?;
        let clone_dir = workdir.path().join("repo");

        info!(repo = %source.repo, git_ref = %source.git_ref, path = %source.path, "Fetching configuration source");
        Self::checkout(&source.repo, &source.git_ref, &clone_dir).await?;

        let root = resolve_config_dir(&clone_dir, &source.path)?;
        let files = tokio::task::spawn_blocking(move || collect_files(&root))
            .await
            .map_err(|e| SourceError::Io(std::io::Error::other(e)))??;

        debug!(repo = %source.repo, count = files.len(), "Fetched configuration files");
        Ok(files)
    }
}

/// Refs are passed to `git` positionally and must not look like options.
pub(crate) fn validate_ref(git_ref: &str) -> Result<(), SourceError> {
    if git_ref.starts_with('-') {
        return Err(SourceError::InvalidRef(git_ref.to_string()));
    }
    Ok(())
}

/// Strip leading `/` and reject any `..` segment.
fn repository_relative(path: &str) -> Result<&Path, SourceError> {
    let relative = Path::new(path.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SourceError::PathEscape(path.to_string()));
    }
    Ok(relative)
}

/// Join the configured path onto the checkout, treating it as repository-relative.
///
/// An existing directory is canonicalized and must stay below the canonical
/// checkout, so a symlink in the repository cannot point the walk elsewhere. A
/// missing directory is returned as joined.
///
/// # Errors
///
/// Returns [`SourceError::PathEscape`] when the path leaves the checkout.
pub(crate) fn resolve_config_dir(checkout: &Path, path: &str) -> Result<PathBuf, SourceError> {
    let joined = checkout.join(repository_relative(path)?);
    if !joined.exists() {
        return Ok(joined);
    }

    let root = joined.canonicalize()?;
    if !root.starts_with(checkout.canonicalize()?) {
        warn!(path = %path, resolved = %root.display(), "Config path resolves outside the checkout");
        return Err(SourceError::PathEscape(path.to_string()));
    }
    Ok(root)
}

/// Read every regular file below `root`, skipping `.git` and non-UTF-8 files.
///
/// A missing `root` yields an empty list.
pub(crate) fn collect_files(root: &Path) -> Result<Vec<SourceFile>, SourceError> {
    if !root.is_dir() {
        warn!(path = %root.display(), "Configuration directory does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        match std::fs::read_to_string(entry.path()) {
            Ok(content) => files.push(SourceFile { file_name, content }),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(file = %entry.path().display(), "Skipping non UTF-8 configuration file");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(files)
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod source_tests;
