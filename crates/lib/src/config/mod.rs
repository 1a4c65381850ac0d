//! Configuration loading and validation.
//!
//! A config file is YAML with a fixed set of keys; unknown keys and values of
//! the wrong type are rejected. Missing keys take defaults:
//!
//! ```yaml
//! env_matrix: env_matrix.yml        # path (relative to this file) or inline mapping
//! blacklists:
//!   - build-fail-blacklist
//! channels:
//!   - conda-forge
//!   - bioconda
//! docker_image: condaforge/linux-anvil
//! requirements: null
//! upload_channel: bioconda
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_DOCKER_IMAGE, DEFAULT_LANGUAGE_VERSION, DEFAULT_UPLOAD_CHANNEL, LANGUAGE_VERSION_AXIS};
use crate::matrix::EnvMatrix;

/// Errors from configuration and environment-matrix handling.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Failed to read a config or matrix file.
  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// File is not valid YAML.
  #[error("failed to parse '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  /// Config does not match the expected schema.
  #[error("invalid config: {0}")]
  Invalid(String),

  /// Environment matrix has the wrong shape.
  #[error("invalid environment matrix: {0}")]
  InvalidMatrix(String),

  /// A matrix axis other than the language version holds a non-string value.
  #[error("all versions except {} must be strings (offending key: {key})", LANGUAGE_VERSION_AXIS)]
  InvalidMatrixValue { key: String },

  /// Language version is not numeric.
  #[error("{0} is an unrecognized version")]
  UnrecognizedVersion(String),
}

/// Where the environment matrix comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvMatrixSpec {
  Path(PathBuf),
  Inline(Value),
}

impl Default for EnvMatrixSpec {
  fn default() -> Self {
    let mut mapping = Mapping::new();
    mapping.insert(
      Value::String(LANGUAGE_VERSION_AXIS.to_string()),
      Value::Number(DEFAULT_LANGUAGE_VERSION.into()),
    );
    EnvMatrixSpec::Inline(Value::Mapping(mapping))
  }
}

/// Config file as written, before defaults are filled in.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  env_matrix: Option<EnvMatrixSpec>,
  blacklists: Option<Vec<PathBuf>>,
  channels: Option<Vec<String>>,
  docker_image: Option<String>,
  requirements: Option<PathBuf>,
  upload_channel: Option<String>,
}

/// Validated configuration with all defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
  /// Environment matrix (file path or inline mapping).
  pub env_matrix: EnvMatrixSpec,

  /// Blacklist files listing recipes to skip.
  pub blacklists: Vec<PathBuf>,

  /// Channels whose published packages count as already built.
  pub channels: Vec<String>,

  /// Container image builds run in.
  pub docker_image: String,

  /// Extra requirements file installed before building.
  pub requirements: Option<PathBuf>,

  /// Channel built packages are uploaded to.
  pub upload_channel: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      env_matrix: EnvMatrixSpec::default(),
      blacklists: Vec::new(),
      channels: Vec::new(),
      docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
      requirements: None,
      upload_channel: DEFAULT_UPLOAD_CHANNEL.to_string(),
    }
  }
}

impl Config {
  /// Load and validate a config file.
  ///
  /// Relative paths inside the file are resolved against the file's directory.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let config = Self::from_value(value, base_dir)?;
    debug!(path = %path.display(), channels = ?config.channels, "loaded config");
    Ok(config)
  }

  /// Validate an in-memory YAML document.
  pub fn from_yaml_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Self::from_value(value, base_dir)
  }

  /// Validate a parsed YAML document and fill in defaults.
  pub fn from_value(value: Value, base_dir: &Path) -> Result<Self, ConfigError> {
    let raw: RawConfig = match value {
      Value::Null => RawConfig::default(),
      value => serde_yaml::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))?,
    };

    let env_matrix = match raw.env_matrix {
      Some(EnvMatrixSpec::Path(p)) => EnvMatrixSpec::Path(resolve_relative(base_dir, &p)),
      Some(EnvMatrixSpec::Inline(v)) => {
        // Reject a malformed inline matrix up front rather than at first use.
        EnvMatrix::from_value(&v)?;
        EnvMatrixSpec::Inline(v)
      }
      None => EnvMatrixSpec::default(),
    };

    let defaults = Config::default();
    Ok(Self {
      env_matrix,
      blacklists: raw
        .blacklists
        .unwrap_or_default()
        .iter()
        .map(|p| resolve_relative(base_dir, p))
        .collect(),
      channels: raw.channels.unwrap_or_default(),
      docker_image: raw.docker_image.unwrap_or(defaults.docker_image),
      requirements: raw.requirements.map(|p| resolve_relative(base_dir, &p)),
      upload_channel: raw.upload_channel.unwrap_or(defaults.upload_channel),
    })
  }

  /// Materialize the environment matrix.
  pub fn env_matrix(&self) -> Result<EnvMatrix, ConfigError> {
    match &self.env_matrix {
      EnvMatrixSpec::Path(path) => EnvMatrix::from_path(path),
      EnvMatrixSpec::Inline(value) => EnvMatrix::from_value(value),
    }
  }
}

fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base_dir.join(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn empty_config_uses_defaults() {
    let config = Config::from_yaml_str("", Path::new("/cfg")).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.docker_image, "condaforge/linux-anvil");
    assert_eq!(config.upload_channel, "bioconda");

    let matrix = config.env_matrix().unwrap();
    let envs: Vec<_> = matrix.iter().collect();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].get("CONDA_PY"), Some("35"));
  }

  #[test]
  fn null_lists_become_empty() {
    let config = Config::from_yaml_str("blacklists: null\nchannels: ~\n", Path::new("/cfg")).unwrap();
    assert!(config.blacklists.is_empty());
    assert!(config.channels.is_empty());
  }

  #[test]
  fn relative_paths_resolve_against_config_dir() {
    let config = Config::from_yaml_str(
      "env_matrix: env_matrix.yml\nblacklists:\n  - bl.txt\n  - /abs/bl.txt\n",
      Path::new("/repo/config"),
    )
    .unwrap();

    assert_eq!(
      config.env_matrix,
      EnvMatrixSpec::Path(PathBuf::from("/repo/config/env_matrix.yml"))
    );
    assert_eq!(
      config.blacklists,
      vec![PathBuf::from("/repo/config/bl.txt"), PathBuf::from("/abs/bl.txt")]
    );
  }

  #[test]
  fn unknown_key_is_rejected() {
    let err = Config::from_yaml_str("chanels: [bioconda]\n", Path::new("/cfg")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn wrong_type_is_rejected() {
    let err = Config::from_yaml_str("channels: bioconda\n", Path::new("/cfg")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn bad_inline_matrix_is_rejected() {
    let err = Config::from_yaml_str("env_matrix:\n  CONDA_NPY: 110\n", Path::new("/cfg")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMatrixValue { .. }));
  }

  #[test]
  fn load_from_file_with_matrix_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("env_matrix.yml"), "CONDA_PY: [\"2.7\", \"3.5\"]\n").unwrap();
    let config_path = dir.path().join("config.yml");
    fs::write(
      &config_path,
      "env_matrix: env_matrix.yml\nchannels:\n  - conda-forge\n  - bioconda\nupload_channel: mine\n",
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.channels, vec!["conda-forge", "bioconda"]);
    assert_eq!(config.upload_channel, "mine");
    assert_eq!(config.env_matrix().unwrap().len(), 2);
  }

  #[test]
  fn missing_file_is_read_error() {
    let err = Config::load(Path::new("/nonexistent/config.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
