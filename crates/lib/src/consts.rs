//! Application-wide constants.

pub const APP_NAME: &str = "rebuilder";

/// The one matrix axis allowed to hold a list of (possibly numeric) values.
pub const LANGUAGE_VERSION_AXIS: &str = "CONDA_PY";

pub const NUMPY_VERSION_AXIS: &str = "CONDA_NPY";

pub const PERL_VERSION_AXIS: &str = "CONDA_PERL";

/// File that marks a directory as a recipe.
pub const RECIPE_META_FILE: &str = "meta.yaml";

/// Recipes untouched for this many days before the last trunk commit are
/// dropped by the quick filter.
pub const QUICK_FILTER_GRACE_DAYS: i64 = 2;

pub const DEFAULT_TRUNK_BRANCH: &str = "master";

pub const DEFAULT_CHANNEL_URL: &str = "https://conda.anaconda.org";

pub const DEFAULT_DOCKER_IMAGE: &str = "condaforge/linux-anvil";

pub const DEFAULT_UPLOAD_CHANNEL: &str = "bioconda";

/// Default language version when a config omits `env_matrix`.
pub const DEFAULT_LANGUAGE_VERSION: u32 = 35;
