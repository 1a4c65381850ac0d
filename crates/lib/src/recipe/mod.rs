//! Recipes: discovery on disk and metadata access.
//!
//! A recipe is a directory containing a `meta.yaml`. Recipes live either
//! directly under the recipe folder (`recipes/bwa`) or one level deeper when
//! several versions are kept side by side (`recipes/bwa/0.7.3`).

pub mod meta;
pub mod selector;

use std::env;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::consts::RECIPE_META_FILE;

pub use meta::{MetadataReader, RecipeError, RecipeMeta, YamlMetadataReader, dependency_name};

/// Find recipe directories under `recipe_folder` matching any of `patterns`.
///
/// A pattern is matched against the folder-relative path, segment by
/// segment, with `*` and `?` wildcards that never cross a `/`. A pattern
/// matches a recipe at its own depth and the versioned recipes one level
/// below it. An empty pattern list means `*`.
///
/// Results are sorted and deduplicated.
pub fn find_recipes(recipe_folder: &Path, patterns: &[String]) -> Vec<PathBuf> {
  let default = ["*".to_string()];
  let patterns = if patterns.is_empty() { &default[..] } else { patterns };
  let max_depth = patterns.iter().map(|p| segments(p).len()).max().unwrap_or(1) + 1;

  let mut found: Vec<PathBuf> = WalkDir::new(recipe_folder)
    .min_depth(1)
    .max_depth(max_depth)
    .follow_links(true)
    .into_iter()
    .filter_map(|entry| match entry {
      Ok(entry) => Some(entry),
      Err(err) => {
        warn!(folder = %recipe_folder.display(), error = %err, "skipping unreadable path");
        None
      }
    })
    .filter(|entry| entry.file_type().is_dir() && entry.path().join(RECIPE_META_FILE).is_file())
    .map(|entry| entry.into_path())
    .filter(|path| {
      let Some(rel) = relative_name(path, recipe_folder) else {
        return false;
      };
      let rel_segments = segments(&rel);
      patterns.iter().any(|pattern| {
        let pat_segments = segments(pattern);
        let depth_ok = rel_segments.len() == pat_segments.len() || rel_segments.len() == pat_segments.len() + 1;
        depth_ok
          && pat_segments
            .iter()
            .zip(&rel_segments)
            .all(|(p, s)| wildcard_match(p, s))
      })
    })
    .collect();

  found.sort();
  found.dedup();
  debug!(folder = %recipe_folder.display(), ?patterns, count = found.len(), "found recipes");
  found
}

/// Path of a recipe relative to the recipe folder, `/`-separated.
///
/// Both paths are resolved against the working directory first, so
/// `./recipes/bwa` under `recipes` is `bwa`.
pub fn relative_name(recipe: &Path, recipe_folder: &Path) -> Option<String> {
  let (recipe, recipe_folder) = (absolute(recipe), absolute(recipe_folder));
  let rel = recipe.strip_prefix(&recipe_folder).ok()?;
  let parts: Vec<String> = rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  Some(parts.join("/"))
}

/// Join `path` onto the working directory and fold `.` and `..` lexically.
fn absolute(path: &Path) -> PathBuf {
  let joined = match env::current_dir() {
    Ok(cwd) if path.is_relative() => cwd.join(path),
    _ => path.to_path_buf(),
  };

  let mut resolved = PathBuf::new();
  for component in joined.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        resolved.pop();
      }
      other => resolved.push(other.as_os_str()),
    }
  }
  resolved
}

fn segments(path: &str) -> Vec<&str> {
  path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Shell-style match of one path segment: `*` is any run, `?` is one char.
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool {
  let p: Vec<char> = pattern.chars().collect();
  let t: Vec<char> = text.chars().collect();
  let (mut pi, mut ti) = (0, 0);
  let mut backtrack: Option<(usize, usize)> = None;

  while ti < t.len() {
    if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
      pi += 1;
      ti += 1;
    } else if pi < p.len() && p[pi] == '*' {
      backtrack = Some((pi, ti));
      pi += 1;
    } else if let Some((star, matched)) = backtrack {
      pi = star + 1;
      ti = matched + 1;
      backtrack = Some((star, matched + 1));
    } else {
      return false;
    }
  }

  p[pi..].iter().all(|&c| c == '*')
}
