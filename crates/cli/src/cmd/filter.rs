//! Implementation of the `rebuilder filter` command.
//!
//! Fetches the configured channels, then walks every recipe and environment
//! to list the packages that still need building.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use rebuilder_lib::channel::{AnacondaChannelIndex, Subdir, fetch_channel_packages};
use rebuilder_lib::filter::{FilterOptions, FilterResult, RecipeFilter};
use rebuilder_lib::platform::Platform;
use rebuilder_lib::recipe::{MetadataReader, YamlMetadataReader, relative_name};
use rebuilder_lib::resolve::{ArtifactResolver, CondaBuildResolver, NativeResolver};
use rebuilder_lib::target::BuildTarget;
use rebuilder_lib::vcs::GitCommitDate;

use super::load_workspace;
use crate::output::{OutputFormat, format_duration, print_item, print_json, print_success, print_warning};

/// How artifact paths are computed.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ResolverKind {
  /// Ask `conda build --output`
  #[default]
  Conda,
  /// Compute from recipe metadata
  Native,
}

pub struct FilterArgs {
  pub recipe_folder: PathBuf,
  pub config: PathBuf,
  pub packages: Vec<String>,
  pub force: bool,
  pub quick: bool,
  pub repo: PathBuf,
  pub branch: String,
  pub platform: Option<String>,
  pub resolver: ResolverKind,
  pub conda: String,
  pub output_dir: PathBuf,
  pub channel_url: String,
  pub jobs: Option<usize>,
  pub format: OutputFormat,
}

#[derive(Serialize)]
struct RecipeTargets<'a> {
  recipe: &'a PathBuf,
  targets: Vec<&'a BuildTarget>,
}

pub fn cmd_filter(args: FilterArgs) -> Result<()> {
  let started = Instant::now();
  let workspace = load_workspace(&args.recipe_folder, &args.config, &args.packages)?;
  let matrix = workspace.config.env_matrix().context("Invalid environment matrix")?;

  let subdir = Subdir::for_platform(args.platform.as_deref())?;
  if workspace.config.channels.is_empty() && !args.force {
    print_warning("No channels configured; only recipe skips will be honored");
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let index = Arc::new(AnacondaChannelIndex::new(&args.channel_url));
  let packages = rt
    .block_on(fetch_channel_packages(index, &workspace.config.channels, &subdir))
    .context("Failed to fetch channel packages")?;

  let reader = Arc::new(YamlMetadataReader::new(Platform::from_name(args.platform.as_deref())));
  let resolver: Box<dyn ArtifactResolver> = match args.resolver {
    ResolverKind::Conda => Box::new(CondaBuildResolver::new(&args.conda)),
    ResolverKind::Native => Box::new(NativeResolver::new(&args.output_dir, reader.clone())),
  };
  let history = GitCommitDate::with_branch(&args.repo, &args.branch);

  let options = FilterOptions {
    force: args.force,
    quick: args.quick,
  };
  let reader: &dyn MetadataReader = reader.as_ref();
  let filter =
    RecipeFilter::new(workspace.recipes, &matrix, &packages, reader, resolver.as_ref()).with_options(options);
  let filter = if args.quick { filter.with_history(&history) } else { filter };

  let mut results: Vec<FilterResult> = match args.jobs {
    Some(jobs) => filter.collect_parallel(jobs)?,
    None => filter.iter().collect::<Result<_, _>>()?,
  };
  results.sort_by(|a, b| a.0.cmp(&b.0));

  if args.format.is_json() {
    let report: Vec<RecipeTargets> = results
      .iter()
      .map(|(recipe, targets)| RecipeTargets {
        recipe,
        targets: sorted(targets),
      })
      .collect();
    print_json(&report)?;
  } else {
    for (recipe, targets) in &results {
      let name = relative_name(recipe, &args.recipe_folder).unwrap_or_else(|| recipe.display().to_string());
      println!("{}", name);
      for target in sorted(targets) {
        print_item(&target.file_name(), &target.env_string());
      }
    }
  }

  print_success(&format!(
    "{} recipe(s) need building ({})",
    results.len(),
    format_duration(started.elapsed())
  ));
  Ok(())
}

fn sorted<'a>(targets: impl IntoIterator<Item = &'a BuildTarget>) -> Vec<&'a BuildTarget> {
  let mut targets: Vec<_> = targets.into_iter().collect();
  targets.sort_by(|a, b| a.artifact().cmp(b.artifact()));
  targets
}
