mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rebuilder_lib::consts::{APP_NAME, DEFAULT_CHANNEL_URL, DEFAULT_TRUNK_BRANCH};

use crate::cmd::{DagFormat, FilterArgs, ResolverKind};
use crate::output::{OutputFormat, print_error};

/// Decide which conda recipes need (re)building
#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List recipes under a recipe folder
  Recipes {
    recipe_folder: PathBuf,

    /// Recipe name patterns (`*` and `?` wildcards)
    #[arg(long, num_args = 1..)]
    packages: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Print the recipe dependency graph
  Dag {
    recipe_folder: PathBuf,

    #[arg(long)]
    config: PathBuf,

    #[arg(long, num_args = 1..)]
    packages: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: DagFormat,

    /// Keep dependencies that are not recipes themselves
    #[arg(long)]
    no_restrict: bool,

    /// Leave out packages with no dependencies and no dependents
    #[arg(long)]
    hide_singletons: bool,
  },

  /// List packages depending on the given ones
  Dependents {
    recipe_folder: PathBuf,

    #[arg(long)]
    config: PathBuf,

    #[arg(long, num_args = 1.., required = true)]
    packages: Vec<String>,

    /// List dependencies instead of dependents
    #[arg(long)]
    reverse: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// List recipes and environments that need building
  Filter {
    recipe_folder: PathBuf,

    #[arg(long)]
    config: PathBuf,

    #[arg(long, num_args = 1..)]
    packages: Vec<String>,

    /// Build every environment, ignoring channels and skip markers
    #[arg(long)]
    force: bool,

    /// Only check recipes changed around the last trunk commit
    #[arg(long)]
    quick: bool,

    /// Git repository used by --quick
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Trunk branch used by --quick
    #[arg(long, default_value = DEFAULT_TRUNK_BRANCH)]
    branch: String,

    /// Target platform (linux, osx); defaults to the current one
    #[arg(long)]
    platform: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    resolver: ResolverKind,

    /// conda executable used by the conda resolver
    #[arg(long, default_value = "conda")]
    conda: String,

    /// Output directory used by the native resolver
    #[arg(long, default_value = "conda-bld")]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_CHANNEL_URL)]
    channel_url: String,

    /// Check recipes on this many threads
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Validate a config file and print it with defaults filled in
  Validate {
    config: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the detected platform
  Info {
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Recipes {
      recipe_folder,
      packages,
      format,
    } => cmd::cmd_recipes(&recipe_folder, &packages, format),
    Commands::Dag {
      recipe_folder,
      config,
      packages,
      format,
      no_restrict,
      hide_singletons,
    } => cmd::cmd_dag(&recipe_folder, &config, &packages, format, !no_restrict, hide_singletons),
    Commands::Dependents {
      recipe_folder,
      config,
      packages,
      reverse,
      format,
    } => cmd::cmd_dependents(&recipe_folder, &config, &packages, reverse, format),
    Commands::Filter {
      recipe_folder,
      config,
      packages,
      force,
      quick,
      repo,
      branch,
      platform,
      resolver,
      conda,
      output_dir,
      channel_url,
      jobs,
      format,
    } => cmd::cmd_filter(FilterArgs {
      recipe_folder,
      config,
      packages,
      force,
      quick,
      repo,
      branch,
      platform,
      resolver,
      conda,
      output_dir,
      channel_url,
      jobs,
      format,
    }),
    Commands::Validate { config, format } => cmd::cmd_validate(&config, format),
    Commands::Info { format } => cmd::cmd_info(format),
  };

  if let Err(e) = result {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
