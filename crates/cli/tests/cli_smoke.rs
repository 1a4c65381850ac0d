//! CLI smoke tests for rebuilder.
//!
//! Each test lays out a small recipe repository in a temp directory and runs
//! the binary against it. Nothing here touches the network: configs list no
//! channels and the filter uses the native resolver.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn rebuilder_cmd() -> Command {
  cargo_bin_cmd!("rebuilder")
}

const ZLIB_META: &str = r#"
package:
  name: zlib
  version: "1.2.8"
build:
  number: 3
"#;

const BWA_META: &str = r#"
package:
  name: bwa
  version: "0.7.15"
build:
  number: 1
requirements:
  build:
    - zlib
  run:
    - zlib
"#;

const PYSAM_META: &str = r#"
{% set version = "0.9.1" %}
package:
  name: pysam
  version: {{ version }}
build:
  number: 0
  skip: True  # [py27]
requirements:
  build:
    - python
    - zlib
  run:
    - python
"#;

const CONFIG: &str = r#"
env_matrix:
  CONDA_PY: [27, 35]
channels: []
"#;

fn write_recipe(root: &Path, rel: &str, meta: &str) {
  let dir = root.join("recipes").join(rel);
  fs::create_dir_all(&dir).unwrap();
  fs::write(dir.join("meta.yaml"), meta).unwrap();
}

/// Recipe repository with zlib, bwa and pysam plus a config file.
fn repo() -> TempDir {
  let temp = TempDir::new().unwrap();
  write_recipe(temp.path(), "zlib", ZLIB_META);
  write_recipe(temp.path(), "bwa", BWA_META);
  write_recipe(temp.path(), "pysam", PYSAM_META);
  fs::write(temp.path().join("config.yml"), CONFIG).unwrap();
  temp
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  rebuilder_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  rebuilder_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("rebuilder"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["recipes", "dag", "dependents", "filter", "validate", "info"] {
    rebuilder_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn info_works() {
  rebuilder_cmd().arg("info").assert().success();
}

// =============================================================================
// recipes
// =============================================================================

#[test]
fn recipes_lists_all_recipes() {
  let temp = repo();
  write_recipe(temp.path(), "samtools/0.1.19", ZLIB_META);

  rebuilder_cmd()
    .arg("recipes")
    .arg(temp.path().join("recipes"))
    .assert()
    .success()
    .stdout(predicate::str::contains("bwa"))
    .stdout(predicate::str::contains("samtools/0.1.19"))
    .stdout(predicate::str::contains("zlib"));
}

#[test]
fn recipes_filters_by_pattern() {
  let temp = repo();

  rebuilder_cmd()
    .arg("recipes")
    .arg(temp.path().join("recipes"))
    .args(["--packages", "py*"])
    .assert()
    .success()
    .stdout(predicate::str::contains("pysam"))
    .stdout(predicate::str::contains("bwa").not());
}

#[test]
fn recipes_missing_folder_fails() {
  let temp = TempDir::new().unwrap();

  rebuilder_cmd()
    .arg("recipes")
    .arg(temp.path().join("nope"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Recipe folder not found"));
}

// =============================================================================
// dag / dependents
// =============================================================================

#[test]
fn dag_text_lists_dependencies() {
  let temp = repo();

  rebuilder_cmd()
    .arg("dag")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .assert()
    .success()
    .stdout(predicate::str::contains("bwa: zlib"))
    .stdout(predicate::str::contains("pysam: zlib"));
}

#[test]
fn dag_text_reports_cycles() {
  let temp = TempDir::new().unwrap();
  write_recipe(
    temp.path(),
    "htslib",
    "package:\n  name: htslib\n  version: \"1.3\"\nrequirements:\n  build:\n    - samtools\n",
  );
  write_recipe(
    temp.path(),
    "samtools",
    "package:\n  name: samtools\n  version: \"1.3\"\nrequirements:\n  build:\n    - htslib\n",
  );
  fs::write(temp.path().join("config.yml"), CONFIG).unwrap();

  rebuilder_cmd()
    .arg("dag")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle:"))
    .stderr(predicate::str::contains("htslib"));
}

#[test]
fn dag_dot_output() {
  let temp = repo();

  rebuilder_cmd()
    .arg("dag")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .args(["--format", "dot"])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("digraph"))
    .stdout(predicate::str::contains("\"zlib\" -> \"bwa\";"));
}

#[test]
fn dag_unrestricted_keeps_external_dependencies() {
  let temp = repo();

  rebuilder_cmd()
    .arg("dag")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .args(["--format", "json", "--no-restrict"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"python\""));
}

#[test]
fn dependents_of_zlib() {
  let temp = repo();

  rebuilder_cmd()
    .arg("dependents")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .args(["--packages", "zlib"])
    .assert()
    .success()
    .stdout(predicate::eq("bwa\npysam\n"));
}

#[test]
fn dependents_unknown_package_fails() {
  let temp = repo();

  rebuilder_cmd()
    .arg("dependents")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .args(["--packages", "nothing"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown package"));
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn validate_accepts_config() {
  let temp = repo();

  rebuilder_cmd()
    .arg("validate")
    .arg(temp.path().join("config.yml"))
    .assert()
    .success()
    .stdout(predicate::str::contains("2 environment(s)"))
    .stdout(predicate::str::contains("condaforge/linux-anvil"));
}

#[test]
fn validate_rejects_unknown_keys() {
  let temp = TempDir::new().unwrap();
  let config = temp.path().join("config.yml");
  fs::write(&config, "channels: []\nupload_chanel: bioconda\n").unwrap();

  rebuilder_cmd()
    .arg("validate")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid config"));
}

// =============================================================================
// filter
// =============================================================================

fn filter_cmd(temp: &TempDir) -> Command {
  let mut cmd = rebuilder_cmd();
  cmd
    .arg("filter")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("config.yml"))
    .args(["--resolver", "native", "--platform", "linux"])
    .arg("--output-dir")
    .arg(temp.path().join("bld"));
  cmd
}

#[test]
fn filter_force_builds_every_environment() {
  let temp = repo();

  filter_cmd(&temp)
    .arg("--force")
    .assert()
    .success()
    .stdout(predicate::str::contains("pysam-0.9.1-py27_0.tar.bz2"))
    .stdout(predicate::str::contains("pysam-0.9.1-py35_0.tar.bz2"))
    .stdout(predicate::str::contains("bwa-0.7.15-1.tar.bz2"))
    .stdout(predicate::str::contains("zlib-1.2.8-3.tar.bz2"));
}

#[test]
fn filter_honors_recipe_skips() {
  let temp = repo();

  filter_cmd(&temp)
    .assert()
    .success()
    .stdout(predicate::str::contains("pysam-0.9.1-py35_0.tar.bz2"))
    .stdout(predicate::str::contains("py27_0").not());
}

#[test]
fn filter_parallel_matches_sequential() {
  let temp = repo();

  let sequential = filter_cmd(&temp).args(["--format", "json"]).output().unwrap();
  let parallel = filter_cmd(&temp).args(["--format", "json", "--jobs", "2"]).output().unwrap();

  assert!(sequential.status.success());
  assert_eq!(sequential.stdout, parallel.stdout);
}

#[test]
fn filter_missing_config_fails() {
  let temp = repo();

  rebuilder_cmd()
    .arg("filter")
    .arg(temp.path().join("recipes"))
    .arg("--config")
    .arg(temp.path().join("missing.yml"))
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("Failed to load config"));
}
