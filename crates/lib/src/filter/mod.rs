//! Build-candidate filtering.
//!
//! For every recipe and every environment in the matrix, decide whether the
//! package needs building: it does unless its artifact is already published
//! in a channel or the recipe skips itself for that environment. Recipes
//! with at least one environment to build are yielded together with the
//! set of targets to build.

mod quick;
mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

pub use quick::quick_filter;
pub use types::{Decision, FilterError, FilterOptions};

use crate::channel::ChannelPackages;
use crate::matrix::{EnvMatrix, EnvVars};
use crate::recipe::MetadataReader;
use crate::resolve::ArtifactResolver;
use crate::target::BuildTarget;
use crate::vcs::CommitDateOracle;

/// A recipe paired with the targets it must build.
pub type FilterResult = (PathBuf, HashSet<BuildTarget>);

/// Decides which recipes need building.
pub struct RecipeFilter<'a> {
  recipes: Vec<PathBuf>,
  matrix: &'a EnvMatrix,
  packages: &'a ChannelPackages,
  reader: &'a dyn MetadataReader,
  resolver: &'a dyn ArtifactResolver,
  history: Option<&'a dyn CommitDateOracle>,
  options: FilterOptions,
}

impl<'a> RecipeFilter<'a> {
  pub fn new(
    recipes: Vec<PathBuf>,
    matrix: &'a EnvMatrix,
    packages: &'a ChannelPackages,
    reader: &'a dyn MetadataReader,
    resolver: &'a dyn ArtifactResolver,
  ) -> Self {
    let mut recipes = recipes;
    recipes.sort();
    recipes.dedup();
    Self {
      recipes,
      matrix,
      packages,
      reader,
      resolver,
      history: None,
      options: FilterOptions::default(),
    }
  }

  pub fn with_options(mut self, options: FilterOptions) -> Self {
    self.options = options;
    self
  }

  /// Commit history used by the quick pre-pass.
  pub fn with_history(mut self, history: &'a dyn CommitDateOracle) -> Self {
    self.history = Some(history);
    self
  }

  pub fn options(&self) -> FilterOptions {
    self.options
  }

  pub fn recipes(&self) -> &[PathBuf] {
    &self.recipes
  }

  /// Whether `recipe` needs building under `env`.
  pub fn must_build(&self, recipe: &Path, env: &EnvVars) -> Result<bool, FilterError> {
    if self.options.force {
      return Ok(true);
    }
    let artifact = self.resolver.artifact_path(recipe, &env.normalized()?)?;
    Ok(self.decide(recipe, env, &artifact)?.must_build())
  }

  fn decide(&self, recipe: &Path, env: &EnvVars, artifact: &Path) -> Result<Decision, FilterError> {
    if self.options.force {
      return Ok(Decision::Forced);
    }

    let file_name = artifact
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let holders = self.packages.channels_containing(&file_name);
    if !holders.is_empty() {
      return Ok(Decision::Published(holders.into_iter().map(str::to_string).collect()));
    }

    if self.reader.is_skipped(recipe, env)? {
      return Ok(Decision::Skipped);
    }

    Ok(Decision::Missing)
  }

  /// Targets `recipe` must build across the whole matrix.
  pub fn targets(&self, recipe: &Path) -> Result<HashSet<BuildTarget>, FilterError> {
    let mut targets = HashSet::new();

    for env in self.matrix {
      let artifact = self.resolver.artifact_path(recipe, &env.normalized()?)?;
      let decision = self.decide(recipe, &env, &artifact)?;

      match &decision {
        Decision::Published(channels) => debug!(
          recipe = %recipe.display(),
          env = %env,
          artifact = %artifact.display(),
          channels = ?channels,
          reason = decision.reason(),
          "not building"
        ),
        _ => debug!(
          recipe = %recipe.display(),
          env = %env,
          artifact = %artifact.display(),
          build = decision.must_build(),
          reason = decision.reason(),
          "decided"
        ),
      }

      if decision.must_build() {
        targets.insert(BuildTarget::new(artifact, env));
      }
    }

    Ok(targets)
  }

  /// Recipes left after the quick pre-pass (all recipes when it is off).
  pub fn candidates(&self) -> Result<Vec<PathBuf>, FilterError> {
    if !self.options.quick {
      return Ok(self.recipes.clone());
    }
    let history = self.history.ok_or(FilterError::NoCommitHistory)?;
    let since = history.last_commit_date()?;
    quick_filter(self.recipes.clone(), since)
  }

  /// Lazily evaluate recipes in sorted order.
  pub fn iter(&self) -> FilterIter<'_, 'a> {
    FilterIter {
      filter: self,
      state: State::Pending,
    }
  }

  /// Evaluate recipes on `jobs` worker threads. Result order is unspecified.
  pub fn collect_parallel(&self, jobs: usize) -> Result<Vec<FilterResult>, FilterError> {
    let candidates = self.candidates()?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs.max(1)).build()?;
    info!(recipes = candidates.len(), jobs, "filtering recipes in parallel");

    pool.install(|| {
      candidates
        .par_iter()
        .filter_map(|recipe| match self.targets(recipe) {
          Ok(targets) if targets.is_empty() => None,
          Ok(targets) => Some(Ok((recipe.clone(), targets))),
          Err(e) => Some(Err(e)),
        })
        .collect()
    })
  }
}

impl<'f, 'a> IntoIterator for &'f RecipeFilter<'a> {
  type Item = Result<FilterResult, FilterError>;
  type IntoIter = FilterIter<'f, 'a>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

enum State {
  Pending,
  Running { candidates: Vec<PathBuf>, next: usize },
  Done,
}

/// Iterator returned by [`RecipeFilter::iter`].
///
/// Ends after the first error.
pub struct FilterIter<'f, 'a> {
  filter: &'f RecipeFilter<'a>,
  state: State,
}

impl Iterator for FilterIter<'_, '_> {
  type Item = Result<FilterResult, FilterError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      match &mut self.state {
        State::Done => return None,
        State::Pending => match self.filter.candidates() {
          Ok(candidates) if candidates.is_empty() => {
            info!("no recipes left to check");
            self.state = State::Done;
          }
          Ok(candidates) => self.state = State::Running { candidates, next: 0 },
          Err(e) => {
            self.state = State::Done;
            return Some(Err(e));
          }
        },
        State::Running { candidates, next } => {
          let Some(recipe) = candidates.get(*next).cloned() else {
            self.state = State::Done;
            return None;
          };
          *next += 1;

          let total = candidates.len();
          info!(
            progress = %format!("{}/{} ({:.1}%)", *next, total, *next as f64 * 100.0 / total as f64),
            recipe = %recipe.display(),
            "checking recipe"
          );

          match self.filter.targets(&recipe) {
            Ok(targets) if targets.is_empty() => continue,
            Ok(targets) => return Some(Ok((recipe, targets))),
            Err(e) => {
              self.state = State::Done;
              return Some(Err(e));
            }
          }
        }
      }
    }
  }
}
