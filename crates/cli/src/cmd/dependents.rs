//! Implementation of the `rebuilder dependents` command.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};

use rebuilder_lib::graph::build_dag;
use rebuilder_lib::recipe::YamlMetadataReader;

use super::load_workspace;
use crate::output::{OutputFormat, print_json};

/// Print everything downstream of `packages` (upstream with `reverse`).
pub fn cmd_dependents(
  recipe_folder: &Path,
  config: &Path,
  packages: &[String],
  reverse: bool,
  format: OutputFormat,
) -> Result<()> {
  let workspace = load_workspace(recipe_folder, config, &[])?;
  let reader = YamlMetadataReader::default();
  let (graph, _) =
    build_dag(&workspace.recipes, &reader, &workspace.blacklist, true).context("Failed to build dependency graph")?;

  let mut related = BTreeSet::new();
  for package in packages {
    if !graph.contains_node(package) {
      bail!("Unknown package: {}", package);
    }
    if reverse {
      related.extend(graph.ancestors(package));
    } else {
      related.extend(graph.descendants(package));
    }
  }
  for package in packages {
    related.remove(package);
  }

  if format.is_json() {
    return print_json(&related);
  }
  for name in &related {
    println!("{}", name);
  }
  Ok(())
}
