//! Implementation of the `rebuilder dag` command.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::json;

use rebuilder_lib::graph::{DependencyGraph, build_dag};
use rebuilder_lib::recipe::YamlMetadataReader;

use super::load_workspace;
use crate::output::{print_json, print_warning};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum DagFormat {
  #[default]
  Text,
  Dot,
  Json,
}

pub fn cmd_dag(
  recipe_folder: &Path,
  config: &Path,
  packages: &[String],
  format: DagFormat,
  restrict: bool,
  hide_singletons: bool,
) -> Result<()> {
  let workspace = load_workspace(recipe_folder, config, packages)?;
  let reader = YamlMetadataReader::default();

  let (graph, index) =
    build_dag(&workspace.recipes, &reader, &workspace.blacklist, restrict).context("Failed to build dependency graph")?;

  let graph = if hide_singletons {
    let connected: Vec<&str> = graph.nodes().filter(|n| !is_singleton(&graph, n)).collect();
    graph.subgraph(connected)
  } else {
    graph
  };

  match format {
    DagFormat::Dot => print!("{}", graph.to_dot()),
    DagFormat::Json => {
      let edges: Vec<[&str; 2]> = graph.edges().map(|(from, to)| [from, to]).collect();
      print_json(&json!({
        "nodes": graph.nodes().collect::<Vec<_>>(),
        "edges": edges,
        "external": graph.external_nodes(),
        "recipes": index,
      }))?;
    }
    DagFormat::Text => {
      for cycle in graph.find_cycles() {
        print_warning(&format!("dependency cycle: {}", cycle.join(" -> ")));
      }
      let order = graph.topological_sort().context("Failed to order packages")?;
      for name in order.iter().filter(|n| graph.contains_node(n)) {
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
          println!("{}", name);
        } else {
          println!("{}: {}", name, deps.join(" "));
        }
      }
    }
  }

  Ok(())
}

fn is_singleton(graph: &DependencyGraph, name: &str) -> bool {
  graph.dependencies_of(name).is_empty() && graph.dependents_of(name).is_empty()
}
