//! The quick pre-pass: keep only recipes touched around the last trunk
//! commit.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::FilterError;
use crate::consts::QUICK_FILTER_GRACE_DAYS;

/// Keep recipes with at least one direct entry modified after
/// `since - QUICK_FILTER_GRACE_DAYS`.
pub fn quick_filter(recipes: Vec<PathBuf>, since: DateTime<Utc>) -> Result<Vec<PathBuf>, FilterError> {
  let threshold = since - Duration::days(QUICK_FILTER_GRACE_DAYS);
  let total = recipes.len();

  let mut kept = Vec::with_capacity(total);
  for recipe in recipes {
    if recently_modified(&recipe, threshold)? {
      kept.push(recipe);
    } else {
      debug!(recipe = %recipe.display(), "unchanged since last commit");
    }
  }

  info!(
    filtered = total - kept.len(),
    remaining = kept.len(),
    threshold = %threshold,
    "quick filter applied"
  );
  Ok(kept)
}

fn recently_modified(recipe: &Path, threshold: DateTime<Utc>) -> Result<bool, FilterError> {
  let io_error = |source| FilterError::Io {
    path: recipe.to_path_buf(),
    source,
  };

  for entry in fs::read_dir(recipe).map_err(io_error)? {
    let modified = entry.and_then(|e| e.metadata()).and_then(|m| m.modified()).map_err(io_error)?;
    if DateTime::<Utc>::from(modified) > threshold {
      return Ok(true);
    }
  }
  Ok(false)
}
