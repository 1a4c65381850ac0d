//! Recipe blacklists.
//!
//! A blacklist file lists one recipe per line, relative to the recipe
//! folder. Blank lines and lines starting with `#` are ignored:
//!
//! ```text
//! # broken upstream
//! recipes/bwa/0.7.3
//! samtools
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::recipe::relative_name;

/// Errors that can occur while loading blacklists.
#[derive(Debug, Error)]
pub enum BlacklistError {
  #[error("failed to read blacklist '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Parse the entries of one blacklist file.
pub fn parse_blacklist(content: &str) -> impl Iterator<Item = &str> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Merge blacklist files into one set of recipe-folder-relative paths.
///
/// Entries are resolved against the working directory; those that land
/// inside the recipe folder are made relative to it (`recipes/bwa` is `bwa`
/// whether the folder is given as `recipes`, `./recipes` or an absolute
/// path). Other entries are kept as written.
pub fn load_blacklist<P: AsRef<Path>>(files: &[P], recipe_folder: &Path) -> Result<BTreeSet<String>, BlacklistError> {
  let mut blacklist = BTreeSet::new();

  for file in files {
    let path = file.as_ref();
    let content = fs::read_to_string(path).map_err(|source| BlacklistError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let before = blacklist.len();
    for entry in parse_blacklist(&content) {
      blacklist.insert(normalize_entry(entry, recipe_folder));
    }
    debug!(file = %path.display(), added = blacklist.len() - before, "loaded blacklist");
  }

  Ok(blacklist)
}

/// Drop blacklisted recipes.
pub fn apply_blacklist(recipes: Vec<PathBuf>, blacklist: &BTreeSet<String>, recipe_folder: &Path) -> Vec<PathBuf> {
  recipes
    .into_iter()
    .filter(|recipe| {
      relative_name(recipe, recipe_folder)
        .map(|rel| !blacklist.contains(&rel))
        .unwrap_or(true)
    })
    .collect()
}

fn normalize_entry(entry: &str, recipe_folder: &Path) -> String {
  let entry = entry.trim_end_matches('/');
  relative_name(Path::new(entry), recipe_folder).unwrap_or_else(|| entry.to_string())
}
