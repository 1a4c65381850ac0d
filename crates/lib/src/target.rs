//! Build targets.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::matrix::EnvVars;

/// One package artifact to build, with the environment that produces it.
///
/// Identity is the artifact path alone: an output path can only be produced
/// once, so two environments that resolve to the same artifact are the same
/// target.
#[derive(Debug, Clone, Serialize)]
pub struct BuildTarget {
  artifact: PathBuf,
  env: EnvVars,
}

impl BuildTarget {
  pub fn new(artifact: PathBuf, env: EnvVars) -> Self {
    Self { artifact, env }
  }

  pub fn artifact(&self) -> &Path {
    &self.artifact
  }

  /// File name of the artifact, as published in a channel.
  pub fn file_name(&self) -> String {
    self
      .artifact
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.artifact.display().to_string())
  }

  pub fn env(&self) -> &EnvVars {
    &self.env
  }

  /// Environment rendered as `KEY=value;KEY=value`.
  pub fn env_string(&self) -> String {
    self.env.env_string()
  }
}

impl PartialEq for BuildTarget {
  fn eq(&self, other: &Self) -> bool {
    self.artifact == other.artifact
  }
}

impl Eq for BuildTarget {}

impl Hash for BuildTarget {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.artifact.hash(state);
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.file_name())
  }
}
