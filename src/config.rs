//! Explicit engine configuration, in place of compiled-in constants.
//!
//! Grounded on `prelude.rs`'s `PROJECT_DIRS` static (`directories::ProjectDirs`) and
//! `package_db/cache.rs`'s `PackageCache::new(base)` constructor.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "cachefile-io"));

pub const DEFAULT_FD_CAP: usize = 64;
pub const DEFAULT_INITIAL_BUCKETS: usize = 512;

/// Configuration for a single [`crate::dispatcher::Engine`] instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// The directory under which `entries/` and `doomed/` are created.
    pub root: PathBuf,
    /// Maximum number of simultaneously open file descriptors.
    pub fd_cap: usize,
    /// Hint for the registry's initial bucket count. Purely an allocation hint: the
    /// backing `HashMap` grows on its own regardless of this value.
    pub initial_buckets: usize,
}

impl CacheConfig {
    pub fn new(root: impl AsRef<Path>) -> Self {
        CacheConfig {
            root: root.as_ref().to_path_buf(),
            fd_cap: DEFAULT_FD_CAP,
            initial_buckets: DEFAULT_INITIAL_BUCKETS,
        }
    }

    pub fn with_fd_cap(mut self, fd_cap: usize) -> Self {
        self.fd_cap = fd_cap;
        self
    }

    pub fn with_initial_buckets(mut self, initial_buckets: usize) -> Self {
        self.initial_buckets = initial_buckets;
        self
    }

    /// The user cache directory for this crate, e.g. `~/.cache/cachefile-io` on Linux.
    /// Returns `InvalidPath` if the platform offers no notion of a user cache
    /// directory (see [`crate::error::CacheIoError::InvalidPath`]).
    pub fn default_root() -> crate::error::Result<PathBuf> {
        PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .ok_or(crate::error::CacheIoError::InvalidPath)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        // unwrap rationale: on a genuinely path-less platform, callers should use
        // `CacheConfig::new` with an explicit root instead of `Default`.
        CacheConfig::new(
            Self::default_root().expect("platform provides no cache directory"),
        )
    }
}
