//! Artifact path resolution: where the package built from a recipe under a
//! given environment would be written.

mod conda;
mod native;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::matrix::EnvVars;
use crate::recipe::RecipeError;

pub use conda::CondaBuildResolver;
pub use native::NativeResolver;

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("failed to run '{command}': {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("'{command}' exited with status {}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
  Process {
    command: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  #[error("'{command}' printed no artifact path")]
  EmptyOutput { command: String },

  #[error("{variable} is not set for recipe '{recipe}'")]
  MissingVariable { recipe: PathBuf, variable: String },

  #[error(transparent)]
  Recipe(#[from] RecipeError),
}

/// Computes the output path of a recipe's package.
///
/// `env` is expected to carry an already normalized language version.
pub trait ArtifactResolver: Send + Sync {
  fn artifact_path(&self, recipe: &Path, env: &EnvVars) -> Result<PathBuf, ResolveError>;
}
