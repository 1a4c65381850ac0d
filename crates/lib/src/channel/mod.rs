//! Channel indexes: which package files a channel has already published.
//!
//! A channel is split into subdirs (`linux-64`, `osx-64`, `noarch`), each
//! carrying a `repodata.json` whose `packages` (and `packages.conda`) keys
//! are the published file names.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::IgnoredAny;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::consts::DEFAULT_CHANNEL_URL;
use crate::platform::Platform;
use crate::platform::os::Os;

/// Subdir holding architecture-independent packages.
pub const NOARCH_SUBDIR: &str = "noarch";

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("request to {url} failed with status {status}")]
  Http { url: String, status: u16 },

  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("invalid repodata from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported platform: {0}")]
  UnsupportedPlatform(String),

  #[error("channel fetch task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

/// A channel platform sub-index name such as `linux-64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subdir(String);

impl Subdir {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  /// Map a short platform name to its subdir. `None` means the current OS,
  /// always on the 64-bit x86 index (`linux-64`, `osx-64`).
  pub fn for_platform(name: Option<&str>) -> Result<Self, ChannelError> {
    let unsupported = || ChannelError::UnsupportedPlatform(name.unwrap_or(std::env::consts::OS).to_string());
    let platform = Platform::from_name(name).ok_or_else(unsupported)?;
    if platform.os == Os::Windows {
      return Err(unsupported());
    }
    Ok(Self::from(platform))
  }

  pub fn noarch() -> Self {
    Self(NOARCH_SUBDIR.to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<Platform> for Subdir {
  fn from(platform: Platform) -> Self {
    Self(platform.subdir())
  }
}

impl fmt::Display for Subdir {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Source of published package file names.
pub trait ChannelIndex: Send + Sync {
  /// File names published in `channel` for `subdir` and for `noarch`.
  fn packages(
    &self,
    channel: &str,
    subdir: &Subdir,
  ) -> impl Future<Output = Result<HashSet<String>, ChannelError>> + Send;
}

/// Reads `repodata.json` from an anaconda.org style server.
#[derive(Debug, Clone)]
pub struct AnacondaChannelIndex {
  base_url: String,
  client: reqwest::Client,
}

impl Default for AnacondaChannelIndex {
  fn default() -> Self {
    Self::new(DEFAULT_CHANNEL_URL)
  }
}

impl AnacondaChannelIndex {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into().trim_end_matches('/').to_string(),
      client: reqwest::Client::new(),
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn repodata_url(&self, channel: &str, subdir: &Subdir) -> String {
    format!("{}/{}/{}/repodata.json", self.base_url, channel, subdir)
  }

  async fn fetch_repodata(&self, url: &str) -> Result<RepoData, ChannelError> {
    debug!(url = %url, "fetching repodata");

    let response = self.client.get(url).send().await.map_err(|source| ChannelError::Request {
      url: url.to_string(),
      source,
    })?;

    if !response.status().is_success() {
      return Err(ChannelError::Http {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }

    let bytes = response.bytes().await.map_err(|source| ChannelError::Request {
      url: url.to_string(),
      source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| ChannelError::Decode {
      url: url.to_string(),
      source,
    })
  }
}

impl ChannelIndex for AnacondaChannelIndex {
  async fn packages(&self, channel: &str, subdir: &Subdir) -> Result<HashSet<String>, ChannelError> {
    let mut packages = HashSet::new();
    for subdir in [subdir.clone(), Subdir::noarch()] {
      let url = self.repodata_url(channel, &subdir);
      let repodata = self.fetch_repodata(&url).await?;
      packages.extend(repodata.into_file_names());
    }
    debug!(channel, subdir = %subdir, count = packages.len(), "read channel index");
    Ok(packages)
  }
}

#[derive(Debug, Default, Deserialize)]
struct RepoData {
  #[serde(default)]
  packages: HashMap<String, IgnoredAny>,
  #[serde(default, rename = "packages.conda")]
  packages_conda: HashMap<String, IgnoredAny>,
}

impl RepoData {
  fn into_file_names(self) -> impl Iterator<Item = String> {
    self.packages.into_keys().chain(self.packages_conda.into_keys())
  }
}

/// Published file names per channel, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPackages {
  channels: Vec<(String, HashSet<String>)>,
}

impl ChannelPackages {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, channel: impl Into<String>, packages: HashSet<String>) {
    let channel = channel.into();
    match self.channels.iter_mut().find(|(name, _)| *name == channel) {
      Some((_, existing)) => existing.extend(packages),
      None => self.channels.push((channel, packages)),
    }
  }

  /// Whether any channel holds `file_name`.
  pub fn contains(&self, file_name: &str) -> bool {
    self.channels.iter().any(|(_, packages)| packages.contains(file_name))
  }

  /// Channels holding `file_name`.
  pub fn channels_containing(&self, file_name: &str) -> Vec<&str> {
    self
      .channels
      .iter()
      .filter(|(_, packages)| packages.contains(file_name))
      .map(|(name, _)| name.as_str())
      .collect()
  }

  pub fn channels(&self) -> impl Iterator<Item = &str> {
    self.channels.iter().map(|(name, _)| name.as_str())
  }

  /// Total number of file names across channels, duplicates included.
  pub fn package_count(&self) -> usize {
    self.channels.iter().map(|(_, packages)| packages.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.channels.is_empty()
  }
}

/// Fetch every channel concurrently. Any failure aborts the whole fetch.
pub async fn fetch_channel_packages<I>(
  index: Arc<I>,
  channels: &[String],
  subdir: &Subdir,
) -> Result<ChannelPackages, ChannelError>
where
  I: ChannelIndex + 'static,
{
  let mut join_set = JoinSet::new();

  for (position, channel) in channels.iter().enumerate() {
    let index = index.clone();
    let channel = channel.clone();
    let subdir = subdir.clone();
    join_set.spawn(async move {
      let packages = index.packages(&channel, &subdir).await?;
      Ok::<_, ChannelError>((position, channel, packages))
    });
  }

  let mut fetched = Vec::with_capacity(channels.len());
  while let Some(result) = join_set.join_next().await {
    fetched.push(result??);
  }
  fetched.sort_by_key(|(position, _, _)| *position);

  let mut packages = ChannelPackages::new();
  for (_, channel, files) in fetched {
    packages.insert(channel, files);
  }
  info!(
    channels = channels.len(),
    packages = packages.package_count(),
    subdir = %subdir,
    "fetched channel packages"
  );
  Ok(packages)
}
