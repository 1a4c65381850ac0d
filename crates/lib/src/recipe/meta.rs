//! Recipe metadata reading.
//!
//! The engine only needs a handful of facts about a recipe: its package name,
//! its build and run requirements, and whether it opts out of the current
//! build environment. [`MetadataReader`] is the seam; [`YamlMetadataReader`]
//! reads them from `meta.yaml`.
//!
//! Environment bindings are always passed in explicitly. Nothing here reads
//! or writes the process environment, so readers are safe to share between
//! threads.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::trace;

use super::selector::{self, Namespace, SelectorError, SelectorValue};
use crate::consts::{LANGUAGE_VERSION_AXIS, NUMPY_VERSION_AXIS, RECIPE_META_FILE};
use crate::matrix::{EnvVars, normalize_language_version};
use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::platform::os::Os;

/// Errors that can occur while reading recipe metadata.
#[derive(Debug, Error)]
pub enum RecipeError {
  /// The recipe's metadata file could not be read.
  #[error("failed to read recipe '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The recipe's metadata is not valid or lacks required fields.
  #[error("failed to parse recipe '{path}': {message}")]
  Parse { path: PathBuf, message: String },

  /// A line selector could not be parsed.
  #[error("invalid selector in recipe '{path}': {source}")]
  Selector {
    path: PathBuf,
    #[source]
    source: SelectorError,
  },
}

/// The parts of a recipe's metadata the engine cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeMeta {
  /// Declared package name.
  pub name: String,

  /// Declared package version.
  pub version: String,

  /// Build number (distinguishes rebuilds of the same version).
  pub build_number: u64,

  /// Whether the recipe opts out of the environment it was read under.
  pub skip: bool,

  /// Full build-time requirement specifiers (`"numpy >=1.9"`).
  pub build_requirements: Vec<String>,

  /// Full run-time requirement specifiers.
  pub run_requirements: Vec<String>,
}

impl RecipeMeta {
  /// Names of all build and run dependencies, version constraints dropped.
  pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
    self
      .build_requirements
      .iter()
      .chain(&self.run_requirements)
      .filter_map(|spec| dependency_name(spec))
  }

  /// Whether any build or run requirement names `package`.
  pub fn depends_on(&self, package: &str) -> bool {
    self.dependency_names().any(|name| name == package)
  }
}

/// Extract the package name from a requirement specifier.
///
/// The name is the first whitespace-delimited token: `"numpy >=1.9"` is
/// `numpy`. Blank specifiers have no name.
pub fn dependency_name(spec: &str) -> Option<&str> {
  spec.split_whitespace().next()
}

/// Source of recipe metadata.
pub trait MetadataReader: Send + Sync {
  /// Read a recipe's metadata as it appears under `env`.
  fn read(&self, recipe: &Path, env: &EnvVars) -> Result<RecipeMeta, RecipeError>;

  /// Whether the recipe declares itself skipped under `env`.
  fn is_skipped(&self, recipe: &Path, env: &EnvVars) -> Result<bool, RecipeError> {
    Ok(self.read(recipe, env)?.skip)
  }
}

/// Reads `meta.yaml` files.
///
/// Before YAML parsing, the text is rendered for the environment:
/// - lines with a `# [selector]` comment are dropped unless the selector holds
/// - `{% set name = "value" %}` lines define variables and are removed
/// - `{{ name }}` is replaced by a variable's value
///
/// Other template statements are dropped; this is not a template engine.
#[derive(Debug, Clone)]
pub struct YamlMetadataReader {
  platform: Option<Platform>,
}

impl Default for YamlMetadataReader {
  fn default() -> Self {
    Self::new(Platform::current())
  }
}

impl YamlMetadataReader {
  /// Create a reader evaluating platform selectors for `platform`.
  pub fn new(platform: Option<Platform>) -> Self {
    Self { platform }
  }

  /// Identifier bindings selectors see for `env`.
  pub fn namespace(&self, env: &EnvVars) -> Namespace {
    let mut ns = Namespace::new();
    let flag = |ns: &mut Namespace, name: &str, value: bool| {
      ns.insert(name.to_string(), SelectorValue::Bool(value));
    };

    if let Some(platform) = self.platform {
      flag(&mut ns, "linux", platform.os == Os::Linux);
      flag(&mut ns, "osx", platform.os == Os::MacOs);
      flag(&mut ns, "win", platform.os == Os::Windows);
      flag(&mut ns, "unix", platform.os != Os::Windows);
      flag(&mut ns, "x86_64", platform.arch == Arch::X86_64);
      flag(&mut ns, "aarch64", platform.arch == Arch::Aarch64);
      flag(&mut ns, "linux64", platform.os == Os::Linux && platform.arch == Arch::X86_64);
      flag(&mut ns, "osx64", platform.os == Os::MacOs && platform.arch == Arch::X86_64);
    }

    if let Some(py) = env.get(LANGUAGE_VERSION_AXIS).and_then(|v| normalize_language_version(v).ok()) {
      let py = i64::from(py);
      ns.insert("py".to_string(), SelectorValue::Int(py));
      flag(&mut ns, &format!("py{}", py), true);
      flag(&mut ns, "py2k", (20..30).contains(&py));
      flag(&mut ns, "py3k", (30..40).contains(&py));
    }

    if let Some(np) = env.get(NUMPY_VERSION_AXIS).and_then(|v| v.trim().parse::<i64>().ok()) {
      ns.insert("np".to_string(), SelectorValue::Int(np));
      flag(&mut ns, &format!("np{}", np), true);
    }

    ns
  }

  /// Render a recipe's text for `env` (selectors applied, variables substituted).
  pub fn render(&self, content: &str, env: &EnvVars, path: &Path) -> Result<String, RecipeError> {
    let ns = self.namespace(env);
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
      let trimmed = line.trim_start();
      if trimmed.starts_with("{%") {
        if let Some((name, value)) = parse_set_statement(trimmed) {
          vars.insert(name, value);
        }
        continue;
      }

      let line = match selector::split_selector(line) {
        Some((body, sel)) => {
          let keep = selector::evaluate(sel, &ns).map_err(|source| RecipeError::Selector {
            path: path.to_path_buf(),
            source,
          })?;
          if !keep {
            trace!(recipe = %path.display(), selector = sel, "selector dropped line");
            continue;
          }
          body
        }
        None => line,
      };

      out.push_str(&substitute_vars(line, &vars));
      out.push('\n');
    }

    Ok(out)
  }

  /// Parse rendered recipe text.
  pub fn parse(&self, rendered: &str, path: &Path) -> Result<RecipeMeta, RecipeError> {
    let parse_err = |message: String| RecipeError::Parse {
      path: path.to_path_buf(),
      message,
    };

    let raw: RawMeta = match serde_yaml::from_str::<Value>(rendered).map_err(|e| parse_err(e.to_string()))? {
      Value::Null => return Err(parse_err("recipe metadata is empty".to_string())),
      value => serde_yaml::from_value(value).map_err(|e| parse_err(e.to_string()))?,
    };

    let package = raw.package.unwrap_or_default();
    let name = package
      .name
      .as_ref()
      .and_then(scalar_to_string)
      .filter(|n| !n.is_empty())
      .ok_or_else(|| parse_err("missing package/name".to_string()))?;
    let version = package.version.as_ref().and_then(scalar_to_string).unwrap_or_default();

    let build = raw.build.unwrap_or_default();
    let build_number = match build.number.as_ref().and_then(scalar_to_string) {
      Some(n) => n
        .trim()
        .parse()
        .map_err(|_| parse_err(format!("build/number '{}' is not a non-negative integer", n)))?,
      None => 0,
    };
    let skip = build.skip.as_ref().is_some_and(truthy);

    let reqs = raw.requirements.unwrap_or_default();
    let specs = |list: Option<Vec<Value>>| -> Vec<String> {
      list
        .unwrap_or_default()
        .iter()
        .filter_map(scalar_to_string)
        .filter(|s| !s.trim().is_empty())
        .collect()
    };
    let mut build_requirements = specs(reqs.build);
    build_requirements.extend(specs(reqs.host));

    Ok(RecipeMeta {
      name,
      version,
      build_number,
      skip,
      build_requirements,
      run_requirements: specs(reqs.run),
    })
  }
}

impl MetadataReader for YamlMetadataReader {
  fn read(&self, recipe: &Path, env: &EnvVars) -> Result<RecipeMeta, RecipeError> {
    let meta_path = recipe.join(RECIPE_META_FILE);
    let content = fs::read_to_string(&meta_path).map_err(|source| RecipeError::Read {
      path: recipe.to_path_buf(),
      source,
    })?;
    let rendered = self.render(&content, env, recipe)?;
    self.parse(&rendered, recipe)
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
  #[serde(default)]
  package: Option<RawPackage>,
  #[serde(default)]
  build: Option<RawBuild>,
  #[serde(default)]
  requirements: Option<RawRequirements>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPackage {
  name: Option<Value>,
  version: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
  number: Option<Value>,
  skip: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRequirements {
  build: Option<Vec<Value>>,
  host: Option<Vec<Value>>,
  run: Option<Vec<Value>>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
    _ => false,
  }
}

/// Parse `{% set name = "value" %}` (single or double quotes).
fn parse_set_statement(stmt: &str) -> Option<(String, String)> {
  let inner = stmt.strip_prefix("{%")?.trim_end().strip_suffix("%}")?;
  let inner = inner.trim().trim_start_matches('-').trim_end_matches('-').trim();
  let rest = inner.strip_prefix("set")?;
  let (name, value) = rest.split_once('=')?;
  let name = name.trim();
  let value = value.trim();
  let unquoted = value
    .strip_prefix('"')
    .and_then(|v| v.strip_suffix('"'))
    .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))?;
  if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return None;
  }
  Some((name.to_string(), unquoted.to_string()))
}

/// Replace `{{ name }}` with known variable values; unknown expressions are
/// left in place.
fn substitute_vars(line: &str, vars: &BTreeMap<String, String>) -> String {
  if !line.contains("{{") {
    return line.to_string();
  }

  let mut out = String::with_capacity(line.len());
  let mut rest = line;
  while let Some(start) = rest.find("{{") {
    let Some(len) = rest[start..].find("}}") else {
      break;
    };
    let expr = rest[start + 2..start + len].trim();
    out.push_str(&rest[..start]);
    match vars.get(expr) {
      Some(value) => out.push_str(value),
      None => out.push_str(&rest[start..start + len + 2]),
    }
    rest = &rest[start + len + 2..];
  }
  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const META: &str = r#"{% set version = "0.7.15" %}
package:
  name: bwa
  version: "{{ version }}"
build:
  number: 2
  skip: True  # [py27]
requirements:
  build:
    - gcc  # [linux]
    - clang  # [osx]
    - zlib >=1.2
    - python
  run:
    - zlib
    - futures  # [py2k]
"#;

  fn linux() -> YamlMetadataReader {
    YamlMetadataReader::new(Some(Platform::new(Arch::X86_64, Os::Linux)))
  }

  fn env(py: &str) -> EnvVars {
    [("CONDA_PY", py)].into_iter().collect()
  }

  fn write_recipe(dir: &Path, content: &str) -> PathBuf {
    let recipe = dir.join("bwa");
    fs::create_dir_all(&recipe).unwrap();
    fs::write(recipe.join("meta.yaml"), content).unwrap();
    recipe
  }

  mod parsing {
    use super::*;

    #[test]
    fn reads_fields_under_env() {
      let temp = TempDir::new().unwrap();
      let recipe = write_recipe(temp.path(), META);

      let meta = linux().read(&recipe, &env("3.5")).unwrap();
      assert_eq!(meta.name, "bwa");
      assert_eq!(meta.version, "0.7.15");
      assert_eq!(meta.build_number, 2);
      assert!(!meta.skip);
      assert_eq!(meta.build_requirements, vec!["gcc", "zlib >=1.2", "python"]);
      assert_eq!(meta.run_requirements, vec!["zlib"]);
    }

    #[test]
    fn skip_follows_selector() {
      let temp = TempDir::new().unwrap();
      let recipe = write_recipe(temp.path(), META);

      assert!(linux().is_skipped(&recipe, &env("2.7")).unwrap());
      assert!(!linux().is_skipped(&recipe, &env("3.5")).unwrap());

      let meta = linux().read(&recipe, &env("27")).unwrap();
      assert!(meta.run_requirements.contains(&"futures".to_string()));
    }

    #[test]
    fn dependency_names_drop_constraints() {
      let meta = RecipeMeta {
        build_requirements: vec!["zlib >=1.2".into(), "python 3.5*".into()],
        run_requirements: vec!["zlib".into(), "   ".into()],
        ..Default::default()
      };
      let names: Vec<&str> = meta.dependency_names().collect();
      assert_eq!(names, vec!["zlib", "python", "zlib"]);
      assert!(meta.depends_on("python"));
      assert!(!meta.depends_on("perl"));
    }

    #[test]
    fn missing_name_is_parse_error() {
      let err = linux()
        .parse("package:\n  version: 1\n", Path::new("/r/x"))
        .unwrap_err();
      assert!(matches!(err, RecipeError::Parse { ref message, .. } if message.contains("package/name")));
    }

    #[test]
    fn invalid_yaml_is_parse_error_with_path() {
      let err = linux().parse("package: [unclosed\n", Path::new("/r/broken")).unwrap_err();
      match err {
        RecipeError::Parse { path, .. } => assert_eq!(path, PathBuf::from("/r/broken")),
        other => panic!("expected parse error, got {other:?}"),
      }
    }

    #[test]
    #[serial_test::serial]
    fn process_environment_is_ignored() {
      let temp = TempDir::new().unwrap();
      let recipe = write_recipe(temp.path(), META);

      temp_env::with_var("CONDA_PY", Some("27"), || {
        assert!(!linux().is_skipped(&recipe, &env("35")).unwrap());
        assert!(!linux().is_skipped(&recipe, &EnvVars::new()).unwrap());
      });
    }

    #[test]
    fn missing_file_is_read_error() {
      let temp = TempDir::new().unwrap();
      let err = linux().read(&temp.path().join("nope"), &EnvVars::new()).unwrap_err();
      assert!(matches!(err, RecipeError::Read { .. }));
    }

    #[test]
    fn bad_selector_is_reported() {
      let err = linux()
        .render("package:\n  name: x  # [py ==]\n", &EnvVars::new(), Path::new("/r/x"))
        .unwrap_err();
      assert!(matches!(err, RecipeError::Selector { .. }));
    }

    #[test]
    fn numeric_scalars_are_stringified() {
      let meta = linux()
        .parse("package:\n  name: foo\n  version: 1.0\nbuild:\n  number: \"3\"\n", Path::new("/r/foo"))
        .unwrap();
      assert_eq!(meta.version, "1.0");
      assert_eq!(meta.build_number, 3);
    }

    #[test]
    fn host_requirements_count_as_build() {
      let meta = linux()
        .parse(
          "package:\n  name: foo\nrequirements:\n  host:\n    - perl\n",
          Path::new("/r/foo"),
        )
        .unwrap();
      assert!(meta.depends_on("perl"));
    }
  }

  mod templating {
    use super::*;

    #[test]
    fn set_statements() {
      assert_eq!(
        parse_set_statement(r#"{% set version = "1.2" %}"#),
        Some(("version".to_string(), "1.2".to_string()))
      );
      assert_eq!(
        parse_set_statement("{%- set name = 'foo' -%}"),
        Some(("name".to_string(), "foo".to_string()))
      );
      assert_eq!(parse_set_statement("{% if py27 %}"), None);
    }

    #[test]
    fn substitution_leaves_unknown_expressions() {
      let mut vars = BTreeMap::new();
      vars.insert("version".to_string(), "1.2".to_string());
      assert_eq!(
        substitute_vars("url: x/{{ version }}/{{ other }}.tgz", &vars),
        "url: x/1.2/{{ other }}.tgz"
      );
    }
  }

  mod namespace {
    use super::*;

    #[test]
    fn language_and_platform_bindings() {
      let ns = linux().namespace(&env("3.5"));
      assert_eq!(ns.get("py"), Some(&SelectorValue::Int(35)));
      assert_eq!(ns.get("py35"), Some(&SelectorValue::Bool(true)));
      assert_eq!(ns.get("py3k"), Some(&SelectorValue::Bool(true)));
      assert_eq!(ns.get("linux"), Some(&SelectorValue::Bool(true)));
      assert_eq!(ns.get("osx"), Some(&SelectorValue::Bool(false)));
      assert!(ns.get("py27").is_none());
    }
  }
}
