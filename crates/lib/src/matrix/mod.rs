//! Build-environment matrix expansion.
//!
//! A matrix file names the build-time variables recipes are built against:
//!
//! ```yaml
//! CONDA_PY:
//!   - "2.7"
//!   - "3.5"
//! CONDA_BOOST: "1.60"
//! CONDA_NPY: "110"
//! ```
//!
//! Every axis except [`LANGUAGE_VERSION_AXIS`] must be a single string. The
//! language axis may list several versions; the matrix yields one
//! [`EnvVars`] per combination:
//!
//! ```text
//! CONDA_BOOST=1.60;CONDA_NPY=110;CONDA_PY=2.7
//! CONDA_BOOST=1.60;CONDA_NPY=110;CONDA_PY=3.5
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::config::ConfigError;
use crate::consts::LANGUAGE_VERSION_AXIS;

/// One concrete set of environment variable bindings.
///
/// Keys are kept sorted so two bindings with the same content compare, hash
/// and render identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvVars(BTreeMap<String, String>);

impl EnvVars {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Render as `KEY=value;KEY=value`, sorted by key.
  pub fn env_string(&self) -> String {
    self
      .0
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join(";")
  }

  /// Return a copy whose language-version binding uses the integer encoding
  /// build tools expect (`"2.7"` becomes `"27"`).
  pub fn normalized(&self) -> Result<EnvVars, ConfigError> {
    let mut out = self.clone();
    if let Some(version) = self.0.get(LANGUAGE_VERSION_AXIS) {
      let encoded = normalize_language_version(version)?;
      out.0.insert(LANGUAGE_VERSION_AXIS.to_string(), encoded.to_string());
    }
    Ok(out)
  }
}

impl fmt::Display for EnvVars {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.env_string())
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

/// Convert a language version to its integer encoding.
///
/// Values below 10 are dotted versions and are multiplied by ten (`"2.7"` is
/// 27, `"3.5"` is 35); values of 10 and above are already encoded and are
/// truncated to an integer.
pub fn normalize_language_version(value: &str) -> Result<u32, ConfigError> {
  let unrecognized = || ConfigError::UnrecognizedVersion(value.to_string());

  let parsed: f64 = value.trim().parse().map_err(|_| unrecognized())?;
  if !parsed.is_finite() || parsed < 0.0 {
    return Err(unrecognized());
  }

  let encoded = if parsed < 10.0 { parsed * 10.0 } else { parsed };
  if encoded > f64::from(u32::MAX) {
    return Err(unrecognized());
  }
  Ok(encoded as u32)
}

/// The set of build environments recipes are checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvMatrix {
  /// Axis name -> candidate values, in declared order.
  axes: BTreeMap<String, Vec<String>>,
}

impl EnvMatrix {
  /// Load a matrix from a YAML file.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_value(&value)
  }

  /// Build a matrix from an already-parsed YAML mapping.
  pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
    let Value::Mapping(mapping) = value else {
      return Err(ConfigError::InvalidMatrix(
        "environment matrix must be a mapping of variable names to values".to_string(),
      ));
    };

    let mut axes = BTreeMap::new();
    for (key, val) in mapping {
      let Some(key) = key.as_str() else {
        return Err(ConfigError::InvalidMatrix(format!(
          "environment matrix keys must be strings, got {:?}",
          key
        )));
      };

      let values = if key == LANGUAGE_VERSION_AXIS {
        language_axis_values(key, val)?
      } else {
        match val {
          Value::String(s) => vec![s.clone()],
          _ => return Err(ConfigError::InvalidMatrixValue { key: key.to_string() }),
        }
      };
      axes.insert(key.to_string(), values);
    }

    Ok(Self { axes })
  }

  /// Build a matrix where every axis has a single value.
  pub fn from_map<K, V, I>(map: I) -> Self
  where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
  {
    Self {
      axes: map.into_iter().map(|(k, v)| (k.into(), vec![v.into()])).collect(),
    }
  }

  /// Candidate values for one axis.
  pub fn axis(&self, key: &str) -> Option<&[String]> {
    self.axes.get(key).map(Vec::as_slice)
  }

  /// Number of combinations iteration yields.
  pub fn len(&self) -> usize {
    self.axes.values().map(Vec::len).product()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Iterate over every combination of axis values.
  ///
  /// Each call starts over, so a matrix can be walked once per recipe.
  pub fn iter(&self) -> EnvMatrixIter<'_> {
    let axes: Vec<(&str, &[String])> = self.axes.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    let exhausted = axes.iter().any(|(_, values)| values.is_empty());
    EnvMatrixIter {
      indices: vec![0; axes.len()],
      axes,
      exhausted,
    }
  }
}

fn language_axis_values(key: &str, val: &Value) -> Result<Vec<String>, ConfigError> {
  let scalar = |v: &Value| match v {
    Value::String(s) => Ok(s.clone()),
    Value::Number(n) => Ok(n.to_string()),
    _ => Err(ConfigError::InvalidMatrixValue { key: key.to_string() }),
  };

  match val {
    Value::Sequence(seq) => seq.iter().map(scalar).collect(),
    other => Ok(vec![scalar(other)?]),
  }
}

impl<'a> IntoIterator for &'a EnvMatrix {
  type Item = EnvVars;
  type IntoIter = EnvMatrixIter<'a>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

/// Cartesian-product iterator over an [`EnvMatrix`].
///
/// Walks the axes like an odometer: the last axis (in key order) varies
/// fastest.
pub struct EnvMatrixIter<'a> {
  axes: Vec<(&'a str, &'a [String])>,
  indices: Vec<usize>,
  exhausted: bool,
}

impl Iterator for EnvMatrixIter<'_> {
  type Item = EnvVars;

  fn next(&mut self) -> Option<Self::Item> {
    if self.exhausted {
      return None;
    }

    let current: EnvVars = self
      .axes
      .iter()
      .zip(&self.indices)
      .map(|((key, values), &i)| (*key, values[i].as_str()))
      .collect();

    // Advance; an empty matrix yields its single empty combination once.
    self.exhausted = true;
    for pos in (0..self.axes.len()).rev() {
      self.indices[pos] += 1;
      if self.indices[pos] < self.axes[pos].1.len() {
        self.exhausted = false;
        break;
      }
      self.indices[pos] = 0;
    }

    Some(current)
  }
}
