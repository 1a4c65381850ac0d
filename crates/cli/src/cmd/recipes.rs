//! Implementation of the `rebuilder recipes` command.

use std::path::Path;

use anyhow::{Result, bail};

use rebuilder_lib::recipe::{find_recipes, relative_name};

use crate::output::{OutputFormat, print_info, print_json};

pub fn cmd_recipes(recipe_folder: &Path, packages: &[String], format: OutputFormat) -> Result<()> {
  if !recipe_folder.is_dir() {
    bail!("Recipe folder not found: {}", recipe_folder.display());
  }

  let recipes = find_recipes(recipe_folder, packages);

  if format.is_json() {
    return print_json(&recipes);
  }

  for recipe in &recipes {
    let name = relative_name(recipe, recipe_folder).unwrap_or_else(|| recipe.display().to_string());
    println!("{}", name);
  }
  print_info(&format!("{} recipe(s)", recipes.len()));
  Ok(())
}
