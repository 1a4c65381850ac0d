pub mod arch;
pub mod os;

use arch::Arch;
use os::Os;
use std::fmt;

/// Platform identifier combining OS and architecture (e.g., "linux-64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Resolve a short platform name (`linux`, `osx`) to an x86_64 platform.
  ///
  /// `None` means the OS we are running on, still on x86_64.
  pub fn from_name(name: Option<&str>) -> Option<Self> {
    let os = match name {
      Some(name) => Os::from_name(name)?,
      None => Os::current()?,
    };
    Some(Self::new(Arch::X86_64, os))
  }

  /// Returns the channel subdirectory holding packages for this platform
  pub fn subdir(&self) -> String {
    let bits = match (self.os, self.arch) {
      (_, Arch::X86_64) => "64",
      (Os::MacOs, Arch::Aarch64) => "arm64",
      (_, Arch::Aarch64) => "aarch64",
    };
    format!("{}-{}", self.os, bits)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.subdir())
  }
}
