//! Types shared by the recipe filter.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::recipe::RecipeError;
use crate::resolve::ResolveError;
use crate::vcs::VcsError;

/// Knobs for a filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
  /// Build every environment regardless of channels or skip markers.
  pub force: bool,

  /// Drop recipes untouched since shortly before the last trunk commit.
  pub quick: bool,
}

#[derive(Debug, Error)]
pub enum FilterError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Vcs(#[from] VcsError),

  #[error("failed to inspect '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("quick filtering needs a commit history source")]
  NoCommitHistory,

  #[error("failed to start worker pool: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why an environment does or does not need a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  /// Forced; nothing was checked.
  Forced,

  /// The artifact is already published in these channels.
  Published(Vec<String>),

  /// The recipe declares itself skipped for the environment.
  Skipped,

  /// Neither published nor skipped.
  Missing,
}

impl Decision {
  pub fn must_build(&self) -> bool {
    matches!(self, Self::Forced | Self::Missing)
  }

  pub fn reason(&self) -> &'static str {
    match self {
      Self::Forced => "forced",
      Self::Published(_) => "already in channel",
      Self::Skipped => "skipped by recipe",
      Self::Missing => "not in any channel",
    }
  }
}
