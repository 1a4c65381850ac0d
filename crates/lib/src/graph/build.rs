//! Dependency graph construction from recipe metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::DependencyGraph;
use crate::matrix::EnvVars;
use crate::recipe::{MetadataReader, RecipeError, RecipeMeta};

/// Package name -> paths of every recipe declaring it, in input order.
pub type NameIndex = BTreeMap<String, Vec<PathBuf>>;

/// Build the dependency graph and name index for a set of recipes.
///
/// Metadata is read without environment bindings. Recipes whose package
/// name is in `blacklist` contribute neither a node nor edges, and no edge
/// ever points from a blacklisted name. With `restrict` set, only
/// dependencies that are themselves (non-blacklisted) recipes produce edges.
///
/// # Errors
///
/// Returns the first [`RecipeError`] encountered; the graph is all or
/// nothing.
pub fn build_dag<P: AsRef<Path>>(
  recipes: &[P],
  reader: &dyn MetadataReader,
  blacklist: &BTreeSet<String>,
  restrict: bool,
) -> Result<(DependencyGraph, NameIndex), RecipeError> {
  let env = EnvVars::new();
  let metadata: Vec<(&Path, RecipeMeta)> = recipes
    .iter()
    .map(|recipe| {
      let recipe = recipe.as_ref();
      reader.read(recipe, &env).map(|meta| (recipe, meta))
    })
    .collect::<Result<_, _>>()?;

  let mut name_index = NameIndex::new();
  for (recipe, meta) in &metadata {
    if blacklist.contains(&meta.name) {
      debug!(recipe = %recipe.display(), name = %meta.name, "skipping blacklisted package");
      continue;
    }
    name_index.entry(meta.name.clone()).or_default().push(recipe.to_path_buf());
  }

  let mut graph = DependencyGraph::new();
  for name in name_index.keys() {
    graph.add_node(name);
  }

  for (recipe, meta) in &metadata {
    if blacklist.contains(&meta.name) {
      continue;
    }
    let deps: BTreeSet<&str> = meta
      .dependency_names()
      .filter(|dep| !blacklist.contains(*dep))
      .filter(|dep| !restrict || name_index.contains_key(*dep))
      .collect();
    for dep in &deps {
      graph.add_edge(dep, &meta.name);
    }
    debug!(recipe = %recipe.display(), name = %meta.name, deps = ?deps, "added recipe to graph");
  }

  info!(
    recipes = metadata.len(),
    nodes = graph.node_count(),
    edges = graph.edge_count(),
    restrict,
    "built dependency graph"
  );

  Ok((graph, name_index))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  /// In-memory reader keyed by recipe path.
  struct FakeReader(HashMap<PathBuf, RecipeMeta>);

  impl FakeReader {
    fn new(recipes: &[(&str, &str, &[&str], &[&str])]) -> Self {
      Self(
        recipes
          .iter()
          .map(|(path, name, build, run)| {
            (
              PathBuf::from(path),
              RecipeMeta {
                name: name.to_string(),
                version: "1.0".to_string(),
                build_requirements: build.iter().map(|s| s.to_string()).collect(),
                run_requirements: run.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
              },
            )
          })
          .collect(),
      )
    }
  }

  impl MetadataReader for FakeReader {
    fn read(&self, recipe: &Path, _env: &EnvVars) -> Result<RecipeMeta, RecipeError> {
      self.0.get(recipe).cloned().ok_or_else(|| RecipeError::Parse {
        path: recipe.to_path_buf(),
        message: "no such recipe".to_string(),
      })
    }
  }

  fn reader() -> FakeReader {
    FakeReader::new(&[
      ("r/zlib", "zlib", &["gcc"], &[]),
      ("r/samtools", "samtools", &["zlib >=1.2", "gcc"], &["zlib"]),
      ("r/samtools/0.1.19", "samtools", &["zlib"], &["zlib"]),
      ("r/bcftools", "bcftools", &["samtools", "htslib"], &["python 3.5*"]),
    ])
  }

  fn paths() -> Vec<PathBuf> {
    ["r/zlib", "r/samtools", "r/samtools/0.1.19", "r/bcftools"]
      .iter()
      .map(PathBuf::from)
      .collect()
  }

  #[test]
  fn restricted_graph_only_has_internal_edges() {
    let (graph, index) = build_dag(&paths(), &reader(), &BTreeSet::new(), true).unwrap();

    assert_eq!(graph.nodes().collect::<Vec<_>>(), vec!["bcftools", "samtools", "zlib"]);
    assert_eq!(
      graph.edges().collect::<Vec<_>>(),
      vec![("samtools", "bcftools"), ("zlib", "samtools")]
    );
    assert!(graph.external_nodes().is_empty());
    assert_eq!(
      index["samtools"],
      vec![PathBuf::from("r/samtools"), PathBuf::from("r/samtools/0.1.19")]
    );
  }

  #[test]
  fn build_and_run_dependency_is_one_edge() {
    let (graph, _) = build_dag(&paths(), &reader(), &BTreeSet::new(), true).unwrap();
    assert_eq!(graph.dependents_of("zlib"), vec!["samtools"]);
    assert_eq!(graph.edge_count(), 2);
  }

  #[test]
  fn unrestricted_graph_keeps_external_sources() {
    let (graph, _) = build_dag(&paths(), &reader(), &BTreeSet::new(), false).unwrap();

    assert_eq!(graph.node_count(), 3);
    assert!(graph.has_edge("gcc", "zlib"));
    assert!(graph.has_edge("python", "bcftools"));
    assert!(graph.has_edge("htslib", "bcftools"));
    assert!(!graph.contains_node("gcc"));
    let external: Vec<&str> = graph.external_nodes().into_iter().collect();
    assert_eq!(external, vec!["gcc", "htslib", "python"]);
  }

  #[test]
  fn blacklisted_names_have_no_node_or_edges() {
    let blacklist: BTreeSet<String> = ["samtools".to_string()].into_iter().collect();

    for restrict in [true, false] {
      let (graph, index) = build_dag(&paths(), &reader(), &blacklist, restrict).unwrap();
      assert!(!graph.contains_node("samtools"));
      assert!(!index.contains_key("samtools"));
      assert!(graph.edges().all(|(from, to)| from != "samtools" && to != "samtools"));
      assert_eq!(graph.node_count(), 2);
    }
  }

  #[test]
  fn unreadable_recipe_aborts_with_its_path() {
    let mut recipes = paths();
    recipes.push(PathBuf::from("r/broken"));

    let err = build_dag(&recipes, &reader(), &BTreeSet::new(), true).unwrap_err();
    match err {
      RecipeError::Parse { path, .. } => assert_eq!(path, PathBuf::from("r/broken")),
      other => panic!("expected parse error, got {other:?}"),
    }
  }

  #[test]
  fn empty_recipe_set() {
    let (graph, index) = build_dag::<PathBuf>(&[], &reader(), &BTreeSet::new(), true).unwrap();
    assert_eq!(graph.node_count(), 0);
    assert!(index.is_empty());
  }
}
