//! Deterministic mapping from a digest to its on-disk path, plus doomed-file naming.
//!
//! Grounded on `kvstore.rs`'s `bytes_to_path_suffix`/`KVFileStore::new` (directory
//! layout and creation) and `package_db/cache.rs`'s `path_for_hash`.

use crate::digest::Digest;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const ENTRIES_DIR: &str = "entries";
const DOOMED_DIR: &str = "doomed";

/// Path to the `entries/` and `doomed/` subdirectories under a cache root.
#[derive(Debug, Clone)]
pub struct CacheTree {
    root: PathBuf,
}

impl CacheTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheTree { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    pub fn doomed_dir(&self) -> PathBuf {
        self.root.join(DOOMED_DIR)
    }

    /// Creates `<root>/entries/` and `<root>/doomed/` if they don't already exist.
    /// Called lazily on first I/O, never at engine start.
    pub fn ensure_created(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.entries_dir())?;
        fs::create_dir_all(self.doomed_dir())?;
        Ok(())
    }

    /// `<root>/entries/<40-HEX>` for the given digest. The hex is always uppercase,
    /// never read back in any other case (Redesign Flag 3 in SPEC_FULL.md).
    pub fn entry_path(&self, digest: &Digest) -> PathBuf {
        self.entries_dir().join(digest.to_hex())
    }

    /// A fresh, non-colliding path under `<root>/doomed/`.
    ///
    /// Seeds a PRNG from the current time in microseconds, then repeatedly draws a
    /// random filename until one doesn't already exist. `fastrand`'s thread-local
    /// generator plays the role the prior design filled with `rand()` seeded
    /// ad hoc; we reseed explicitly so successive calls within the same microsecond
    /// don't all draw the same sequence.
    pub fn fresh_doomed_path(&self) -> PathBuf {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        fastrand::seed(seed);
        let dir = self.doomed_dir();
        loop {
            let candidate = dir.join(fastrand::u64(..).to_string());
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entry_path_is_uppercase_hex_under_entries() {
        let tree = CacheTree::new("/cache-root");
        let digest = Digest::of(b"http://a/");
        let path = tree.entry_path(&digest);
        assert_eq!(path.parent().unwrap(), Path::new("/cache-root/entries"));
        let leaf = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(leaf, leaf.to_ascii_uppercase());
        assert_eq!(leaf.len(), 40);
    }

    #[test]
    fn fresh_doomed_path_does_not_collide_with_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = CacheTree::new(tmp.path());
        tree.ensure_created().unwrap();
        let p1 = tree.fresh_doomed_path();
        fs::write(&p1, b"x").unwrap();
        let p2 = tree.fresh_doomed_path();
        assert_ne!(p1, p2);
        assert!(p2.parent().unwrap().ends_with("doomed"));
    }

    #[test]
    fn ensure_created_makes_both_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = CacheTree::new(tmp.path());
        tree.ensure_created().unwrap();
        assert!(tree.entries_dir().is_dir());
        assert!(tree.doomed_dir().is_dir());
    }
}
