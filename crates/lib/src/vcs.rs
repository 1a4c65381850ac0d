//! Commit history lookups for the quick filter.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::consts::DEFAULT_TRUNK_BRANCH;

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("failed to open repository at {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("branch '{0}' not found")]
  BranchNotFound(String),

  #[error("failed to read commit on '{branch}': {message}")]
  Commit { branch: String, message: String },

  #[error("commit time {0} is out of range")]
  InvalidTime(i64),
}

/// Source of the date the trunk branch last moved.
pub trait CommitDateOracle: Send + Sync {
  fn last_commit_date(&self) -> Result<DateTime<Utc>, VcsError>;
}

/// Reads the tip commit of a branch in a local git repository.
#[derive(Debug, Clone)]
pub struct GitCommitDate {
  repo_path: PathBuf,
  branch: String,
}

impl GitCommitDate {
  /// Oracle for the default trunk branch of the repository at `repo_path`.
  pub fn new(repo_path: impl Into<PathBuf>) -> Self {
    Self::with_branch(repo_path, DEFAULT_TRUNK_BRANCH)
  }

  pub fn with_branch(repo_path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
    Self {
      repo_path: repo_path.into(),
      branch: branch.into(),
    }
  }

  pub fn repo_path(&self) -> &Path {
    &self.repo_path
  }

  pub fn branch(&self) -> &str {
    &self.branch
  }
}

impl CommitDateOracle for GitCommitDate {
  /// Committer time of the branch tip, truncated to midnight UTC.
  fn last_commit_date(&self) -> Result<DateTime<Utc>, VcsError> {
    let repo = gix::open(&self.repo_path).map_err(|e| VcsError::Open {
      path: self.repo_path.clone(),
      source: Box::new(e),
    })?;

    let id = repo
      .rev_parse_single(self.branch.as_str())
      .map_err(|_| VcsError::BranchNotFound(self.branch.clone()))?;

    let commit_error = |message: String| VcsError::Commit {
      branch: self.branch.clone(),
      message,
    };
    let commit = id
      .object()
      .map_err(|e| commit_error(e.to_string()))?
      .peel_to_commit()
      .map_err(|e| commit_error(e.to_string()))?;
    let time = commit.time().map_err(|e| commit_error(e.to_string()))?;

    let committed = DateTime::from_timestamp(time.seconds, 0).ok_or(VcsError::InvalidTime(time.seconds))?;
    let day = committed.date_naive().and_time(NaiveTime::MIN).and_utc();

    debug!(branch = %self.branch, commit = %commit.id, date = %day, "resolved last commit date");
    Ok(day)
  }
}
