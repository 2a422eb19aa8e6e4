//! A thin global accessor for call sites that can't carry an [`Engine`] value
//! through to where they need one.
//!
//! [`Engine::start`] is the primary, recommended way to get an engine (Redesign
//! Flag 4 in SPEC_FULL.md); this module exists only because some callers — a `Drop`
//! impl deep in another crate, an FFI boundary — genuinely cannot thread one through.
//! Grounded on `prelude.rs`'s `PROJECT_DIRS: Lazy<ProjectDirs>`, generalized from "lazily
//! computed" to "set once, read many".

use once_cell::sync::OnceCell;

use crate::dispatcher::Engine;
use crate::error::{CacheIoError, Result};

static GLOBAL_ENGINE: OnceCell<Engine> = OnceCell::new();

/// Installs `engine` as the process-wide default. Fails with `InvalidArgument` if one
/// has already been installed; there is no way to replace it short of process exit,
/// since callers may already hold the old `Engine` clone.
pub fn install_global(engine: Engine) -> Result<()> {
    GLOBAL_ENGINE
        .set(engine)
        .map_err(|_| CacheIoError::InvalidArgument("global engine already installed".into()))
}

/// Returns the process-wide engine installed by [`install_global`], or
/// `NotInitialized` if none has been installed yet.
pub fn global() -> Result<Engine> {
    GLOBAL_ENGINE.get().cloned().ok_or(CacheIoError::NotInitialized)
}
