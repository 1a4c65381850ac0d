use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error};

use super::{ArtifactResolver, ResolveError};
use crate::matrix::EnvVars;

/// Asks `conda build --output` for the artifact path.
///
/// Environment bindings are applied to the child process only.
#[derive(Debug, Clone)]
pub struct CondaBuildResolver {
  program: OsString,
}

impl Default for CondaBuildResolver {
  fn default() -> Self {
    Self::new("conda")
  }
}

impl CondaBuildResolver {
  pub fn new(program: impl Into<OsString>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

impl ArtifactResolver for CondaBuildResolver {
  fn artifact_path(&self, recipe: &Path, env: &EnvVars) -> Result<PathBuf, ResolveError> {
    let command = format!(
      "{} build --output {}",
      self.program.to_string_lossy(),
      recipe.display()
    );
    debug!(command = %command, env = %env, "resolving artifact path");

    let output = Command::new(&self.program)
      .args(["build", "--output"])
      .arg(recipe)
      .envs(env.iter())
      .output()
      .map_err(|source| ResolveError::Spawn {
        command: command.clone(),
        source,
      })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
      debug!(stdout = %stdout, "conda build stdout");
      error!(stderr = %stderr, recipe = %recipe.display(), "conda build failed");
      return Err(ResolveError::Process {
        command,
        code: output.status.code(),
        stdout,
        stderr,
      });
    }

    stdout
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .last()
      .map(PathBuf::from)
      .ok_or(ResolveError::EmptyOutput { command })
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::os::unix::fs::PermissionsExt;
  use tempfile::TempDir;

  /// Write an executable shell script standing in for conda.
  fn fake_conda(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("conda");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  fn env(pairs: &[(&str, &str)]) -> EnvVars {
    pairs.iter().copied().collect()
  }

  #[test]
  #[serial]
  fn last_output_line_is_the_path() {
    let dir = TempDir::new().unwrap();
    let conda = fake_conda(
      &dir,
      r#"echo "Removing old build environment"
echo "/opt/conda/conda-bld/linux-64/$(basename "$3")-1.0-py${CONDA_PY}_0.tar.bz2"
echo"#,
    );

    let resolver = CondaBuildResolver::new(conda);
    let path = resolver
      .artifact_path(Path::new("recipes/pysam"), &env(&[("CONDA_PY", "35")]))
      .unwrap();

    assert_eq!(path, PathBuf::from("/opt/conda/conda-bld/linux-64/pysam-1.0-py35_0.tar.bz2"));
  }

  #[test]
  #[serial]
  fn bindings_reach_only_the_child() {
    let dir = TempDir::new().unwrap();
    let conda = fake_conda(&dir, r#"echo "/out/${CONDA_PERL}.tar.bz2""#);
    let resolver = CondaBuildResolver::new(conda);

    let first = resolver
      .artifact_path(Path::new("r"), &env(&[("CONDA_PERL", "5.22.0")]))
      .unwrap();
    let second = resolver.artifact_path(Path::new("r"), &EnvVars::new()).unwrap();

    assert_eq!(first, PathBuf::from("/out/5.22.0.tar.bz2"));
    assert_eq!(second, PathBuf::from("/out/.tar.bz2"));
  }

  #[test]
  #[serial]
  fn non_zero_exit_captures_output() {
    let dir = TempDir::new().unwrap();
    let conda = fake_conda(&dir, "echo partial\necho 'bad recipe' >&2\nexit 3");

    let err = CondaBuildResolver::new(conda)
      .artifact_path(Path::new("r"), &EnvVars::new())
      .unwrap_err();

    match err {
      ResolveError::Process {
        code, stdout, stderr, ..
      } => {
        assert_eq!(code, Some(3));
        assert_eq!(stdout.trim(), "partial");
        assert_eq!(stderr.trim(), "bad recipe");
      }
      other => panic!("expected process error, got {other:?}"),
    }
  }

  #[test]
  #[serial]
  fn empty_output_is_an_error() {
    let dir = TempDir::new().unwrap();
    let conda = fake_conda(&dir, "true");

    let err = CondaBuildResolver::new(conda)
      .artifact_path(Path::new("r"), &EnvVars::new())
      .unwrap_err();
    assert!(matches!(err, ResolveError::EmptyOutput { .. }));
  }

  #[test]
  #[serial]
  fn missing_program_is_a_spawn_error() {
    let err = CondaBuildResolver::new("/nonexistent/conda")
      .artifact_path(Path::new("r"), &EnvVars::new())
      .unwrap_err();
    assert!(matches!(err, ResolveError::Spawn { .. }));
  }
}
