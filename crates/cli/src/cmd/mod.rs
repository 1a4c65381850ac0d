mod dag;
mod dependents;
mod filter;
mod info;
mod recipes;
mod validate;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use rebuilder_lib::blacklist::{apply_blacklist, load_blacklist};
use rebuilder_lib::config::Config;
use rebuilder_lib::recipe::find_recipes;

pub use dag::{DagFormat, cmd_dag};
pub use dependents::cmd_dependents;
pub use filter::{FilterArgs, ResolverKind, cmd_filter};
pub use info::cmd_info;
pub use recipes::cmd_recipes;
pub use validate::cmd_validate;

/// A loaded config with the recipes it applies to.
struct Workspace {
  config: Config,
  blacklist: BTreeSet<String>,
  recipes: Vec<PathBuf>,
}

/// Load `config_path` and find the non-blacklisted recipes matching `packages`.
fn load_workspace(recipe_folder: &Path, config_path: &Path, packages: &[String]) -> Result<Workspace> {
  let config =
    Config::load(config_path).with_context(|| format!("Failed to load config: {}", config_path.display()))?;

  let blacklist = load_blacklist(&config.blacklists, recipe_folder).context("Failed to load blacklists")?;

  let found = find_recipes(recipe_folder, packages);
  let total = found.len();
  let recipes = apply_blacklist(found, &blacklist, recipe_folder);
  tracing::info!(
    found = total,
    blacklisted = total - recipes.len(),
    folder = %recipe_folder.display(),
    "collected recipes"
  );

  Ok(Workspace {
    config,
    blacklist,
    recipes,
  })
}
