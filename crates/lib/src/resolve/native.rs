use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{ArtifactResolver, ResolveError};
use crate::consts::{LANGUAGE_VERSION_AXIS, NUMPY_VERSION_AXIS, PERL_VERSION_AXIS};
use crate::matrix::EnvVars;
use crate::recipe::{MetadataReader, RecipeMeta, dependency_name};

/// Computes artifact paths from recipe metadata without invoking conda.
///
/// The file name follows conda-build's default build string:
/// `{name}-{version}-{prefix}{build_number}.tar.bz2`, where the prefix
/// encodes the numpy/python/perl versions the package is tied to.
#[derive(Clone)]
pub struct NativeResolver {
  output_dir: PathBuf,
  reader: Arc<dyn MetadataReader>,
}

impl NativeResolver {
  pub fn new(output_dir: impl Into<PathBuf>, reader: Arc<dyn MetadataReader>) -> Self {
    Self {
      output_dir: output_dir.into(),
      reader,
    }
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// Build string prefix for `meta` under `env`. Only run requirements
  /// tie a package to a language version.
  pub fn build_prefix(recipe: &Path, meta: &RecipeMeta, env: &EnvVars) -> Result<String, ResolveError> {
    let var = |name: &str| {
      env.get(name).ok_or_else(|| ResolveError::MissingVariable {
        recipe: recipe.to_path_buf(),
        variable: name.to_string(),
      })
    };

    let runs_with = |package: &str| {
      meta
        .run_requirements
        .iter()
        .filter_map(|spec| dependency_name(spec))
        .any(|name| name == package)
    };

    let prefix = if runs_with("numpy") && runs_with("python") {
      format!("np{}py{}_", var(NUMPY_VERSION_AXIS)?, var(LANGUAGE_VERSION_AXIS)?)
    } else if runs_with("python") {
      format!("py{}_", var(LANGUAGE_VERSION_AXIS)?)
    } else if runs_with("perl") {
      format!("pl{}_", var(PERL_VERSION_AXIS)?)
    } else {
      String::new()
    };
    Ok(prefix)
  }
}

impl ArtifactResolver for NativeResolver {
  fn artifact_path(&self, recipe: &Path, env: &EnvVars) -> Result<PathBuf, ResolveError> {
    let meta = self.reader.read(recipe, env)?;
    let prefix = Self::build_prefix(recipe, &meta, env)?;
    let file_name = format!("{}-{}-{}{}.tar.bz2", meta.name, meta.version, prefix, meta.build_number);
    debug!(recipe = %recipe.display(), file = %file_name, "computed artifact path");
    Ok(self.output_dir.join(file_name))
  }
}

impl std::fmt::Debug for NativeResolver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NativeResolver").field("output_dir", &self.output_dir).finish_non_exhaustive()
  }
}
