//! Implementation of the `rebuilder validate` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use rebuilder_lib::config::{Config, EnvMatrixSpec};

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub fn cmd_validate(path: &Path, format: OutputFormat) -> Result<()> {
  let config = Config::load(path).with_context(|| format!("Invalid config: {}", path.display()))?;
  let matrix = config.env_matrix().context("Invalid environment matrix")?;

  if format.is_json() {
    return print_json(&json!({ "config": config, "environments": matrix.len() }));
  }

  print_success(&format!("{} is valid", path.display()));
  let source = match &config.env_matrix {
    EnvMatrixSpec::Path(p) => p.display().to_string(),
    EnvMatrixSpec::Inline(_) => "inline".to_string(),
  };
  print_stat("Environment matrix", &format!("{} ({} environment(s))", source, matrix.len()));
  print_stat("Channels", &config.channels.join(", "));
  let blacklists: Vec<String> = config.blacklists.iter().map(|p| p.display().to_string()).collect();
  print_stat("Blacklists", &blacklists.join(", "));
  print_stat("Docker image", &config.docker_image);
  print_stat(
    "Requirements",
    &config
      .requirements
      .as_ref()
      .map_or_else(|| "none".to_string(), |p| p.display().to_string()),
  );
  print_stat("Upload channel", &config.upload_channel);
  Ok(())
}
