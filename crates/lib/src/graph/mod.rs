//! Package dependency graph over a recipe set.
//!
//! Nodes are package names; an edge `A -> B` means "B depends on A", so
//! walking edges forward goes from a package to everything that must be
//! rebuilt after it. The graph is an explicit adjacency structure with a
//! reverse index, built once and read-only afterwards.
//!
//! # Building
//!
//! [`build_dag`] reads every recipe's metadata and:
//! 1. Indexes package name -> recipe paths (a name may have several versions)
//! 2. Adds one node per non-blacklisted package name
//! 3. Adds an edge from each build/run dependency to the recipe's package,
//!    keeping only dependencies that are themselves recipes when `restrict`
//!    is set
//!
//! With `restrict` off, dependencies outside the recipe set still become
//! edge sources but are not nodes; see [`DependencyGraph::external_nodes`].

mod build;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt::Write as _;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use build::{NameIndex, build_dag};

/// Errors that can occur during graph traversal.
#[derive(Debug, Error)]
pub enum GraphError {
  /// The graph has a cycle, so no topological order exists.
  #[error("dependency cycle detected: {}", .0.join(" -> "))]
  Cycle(Vec<String>),
}

/// Directed dependency graph of package names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
  /// Package names of the recipes in the graph.
  nodes: BTreeSet<String>,

  /// Edges: dependency -> dependents.
  edges: BTreeMap<String, BTreeSet<String>>,

  /// Reverse edges: dependent -> dependencies.
  reverse_edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
  /// Create a new empty dependency graph.
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a node. Adding an existing node is a no-op.
  pub fn add_node(&mut self, name: &str) {
    self.nodes.insert(name.to_string());
  }

  /// Add an edge meaning "`dependent` depends on `dependency`".
  ///
  /// Self-edges and duplicates are ignored. Neither endpoint is added as a
  /// node.
  pub fn add_edge(&mut self, dependency: &str, dependent: &str) {
    if dependency == dependent {
      return;
    }
    self
      .edges
      .entry(dependency.to_string())
      .or_default()
      .insert(dependent.to_string());
    self
      .reverse_edges
      .entry(dependent.to_string())
      .or_default()
      .insert(dependency.to_string());
  }

  /// All package nodes, sorted.
  pub fn nodes(&self) -> impl Iterator<Item = &str> {
    self.nodes.iter().map(String::as_str)
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn contains_node(&self, name: &str) -> bool {
    self.nodes.contains(name)
  }

  /// All edges as `(dependency, dependent)` pairs, sorted.
  pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .edges
      .iter()
      .flat_map(|(from, tos)| tos.iter().map(move |to| (from.as_str(), to.as_str())))
  }

  pub fn edge_count(&self) -> usize {
    self.edges.values().map(BTreeSet::len).sum()
  }

  pub fn has_edge(&self, dependency: &str, dependent: &str) -> bool {
    self.edges.get(dependency).is_some_and(|d| d.contains(dependent))
  }

  /// Edge endpoints that are not package nodes (dependencies from outside
  /// the recipe set, present only when built unrestricted).
  pub fn external_nodes(&self) -> BTreeSet<&str> {
    self
      .edges
      .keys()
      .chain(self.reverse_edges.keys())
      .map(String::as_str)
      .filter(|name| !self.nodes.contains(*name))
      .collect()
  }

  /// Direct dependencies of a package.
  pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
    self
      .reverse_edges
      .get(name)
      .map(|deps| deps.iter().map(String::as_str).collect())
      .unwrap_or_default()
  }

  /// Direct dependents of a package.
  pub fn dependents_of(&self, name: &str) -> Vec<&str> {
    self
      .edges
      .get(name)
      .map(|deps| deps.iter().map(String::as_str).collect())
      .unwrap_or_default()
  }

  /// Everything `name` transitively depends on.
  pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
    Self::reachable(&self.reverse_edges, name)
  }

  /// Everything that transitively depends on `name`.
  pub fn descendants(&self, name: &str) -> BTreeSet<String> {
    Self::reachable(&self.edges, name)
  }

  fn reachable(adjacency: &BTreeMap<String, BTreeSet<String>>, start: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
      if let Some(next) = adjacency.get(current) {
        for n in next {
          if n != start && seen.insert(n.clone()) {
            queue.push_back(n);
          }
        }
      }
    }

    seen
  }

  /// Topologically sort all nodes and edge endpoints.
  ///
  /// Dependencies come before dependents; ties are broken by name so the
  /// order is deterministic.
  pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
    let all: BTreeSet<&str> = self.nodes().chain(self.external_nodes()).collect();
    let mut in_degree: BTreeMap<&str, usize> = all
      .iter()
      .map(|&n| (n, self.reverse_edges.get(n).map_or(0, BTreeSet::len)))
      .collect();

    let mut ready: BTreeSet<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
    let mut order = Vec::with_capacity(all.len());

    while let Some(current) = ready.pop_first() {
      order.push(current.to_string());
      if let Some(dependents) = self.edges.get(current) {
        for dependent in dependents {
          if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
            *deg -= 1;
            if *deg == 0 {
              ready.insert(dependent.as_str());
            }
          }
        }
      }
    }

    if order.len() < all.len() {
      let cycle = self.find_cycles().into_iter().next().unwrap_or_default();
      warn!(cycle = ?cycle, "cycle detected in dependency graph");
      return Err(GraphError::Cycle(cycle));
    }

    Ok(order)
  }

  /// Find cycles reachable by depth-first search.
  pub fn find_cycles(&self) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    let mut on_stack = HashSet::new();

    let starts: Vec<&str> = self.nodes().chain(self.external_nodes()).collect();
    for start in starts {
      if !visited.contains(start) {
        self.find_cycles_dfs(start, &mut visited, &mut stack, &mut on_stack, &mut cycles);
      }
    }

    cycles
  }

  fn find_cycles_dfs<'a>(
    &'a self,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    cycles: &mut Vec<Vec<String>>,
  ) {
    visited.insert(name);
    stack.push(name);
    on_stack.insert(name);

    if let Some(dependents) = self.edges.get(name) {
      for dep in dependents {
        let dep = dep.as_str();
        if !visited.contains(dep) {
          self.find_cycles_dfs(dep, visited, stack, on_stack, cycles);
        } else if on_stack.contains(dep)
          && let Some(start) = stack.iter().position(|n| *n == dep)
        {
          cycles.push(stack[start..].iter().map(|s| s.to_string()).collect());
        }
      }
    }

    stack.pop();
    on_stack.remove(name);
  }

  /// The subgraph induced by `names`: those nodes and the edges between them.
  pub fn subgraph<'a, I>(&self, names: I) -> DependencyGraph
  where
    I: IntoIterator<Item = &'a str>,
  {
    let keep: BTreeSet<&str> = names.into_iter().collect();
    let mut sub = DependencyGraph::new();
    for node in self.nodes().filter(|n| keep.contains(n)) {
      sub.add_node(node);
    }
    for (from, to) in self.edges().filter(|(f, t)| keep.contains(f) && keep.contains(t)) {
      sub.add_edge(from, to);
    }
    sub
  }

  /// Render in Graphviz dot format.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph recipes {\n");
    for node in self.nodes() {
      let _ = writeln!(out, "  \"{}\";", node);
    }
    for (from, to) in self.edges() {
      let _ = writeln!(out, "  \"{}\" -> \"{}\";", from, to);
    }
    out.push_str("}\n");
    out
  }
}
