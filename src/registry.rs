//! The table of live handles, keyed by digest.
//!
//! Each digest maps to a bucket holding an ordered list of handles; only the front of
//! that list may be "live" (not doomed). This is the idiomatic-Rust answer to the
//! chained hash table described upstream: handles carry their digest inline (Redesign
//! Flag 1 in SPEC_FULL.md) and the registry does a `HashMap` lookup per mutation
//! instead of reseating a pointer on every rehash.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::digest::Digest;
use crate::error::{CacheIoError, Result};
use crate::handle::{Handle, HandleFlags};

struct Bucket {
    handles: VecDeque<Arc<Handle>>,
}

/// Owned outright by the worker thread; never shared by reference across threads (see
/// SPEC_FULL.md §5, "single-writer discipline").
pub(crate) struct Registry {
    buckets: HashMap<Digest, Bucket>,
}

impl Registry {
    pub fn with_capacity_hint(initial_buckets: usize) -> Self {
        Registry {
            buckets: HashMap::with_capacity(initial_buckets),
        }
    }

    /// The head handle for `digest`, if one exists and isn't doomed. A doomed head
    /// masks the rest of the bucket from lookups (property 1 in SPEC_FULL.md §8).
    pub fn get_handle(&self, digest: Digest) -> Result<Arc<Handle>> {
        match self.buckets.get(&digest).and_then(|b| b.handles.front()) {
            Some(h) if !h.is_doomed() => Ok(Arc::clone(h)),
            _ => Err(CacheIoError::NotAvailable),
        }
    }

    /// Allocates a fresh handle and makes it the live head of `digest`'s bucket.
    /// Panics if the current head is not doomed — the one illegal case, since callers
    /// are responsible for dooming any live handle before replacing it (see
    /// `dispatcher::open_file_internal`'s `CREATE_NEW` path).
    pub fn new_handle(
        &mut self,
        digest: Digest,
        path: std::path::PathBuf,
        file_exists: bool,
    ) -> Arc<Handle> {
        let bucket = self
            .buckets
            .entry(digest)
            .or_insert_with(|| Bucket { handles: VecDeque::new() });
        if let Some(head) = bucket.handles.front() {
            assert!(
                head.is_doomed(),
                "new_handle called while a live handle already exists for {digest:?}"
            );
        }
        let handle = Handle::new(digest, path, file_exists);
        bucket.handles.push_front(Arc::clone(&handle));
        handle
    }

    /// Unlinks `handle` from its bucket, dropping the registry's strong reference.
    /// Removes the bucket entirely once its list is empty.
    pub fn remove_handle(&mut self, handle: &Arc<Handle>) {
        let digest = handle.digest();
        let mut remove_bucket = false;
        if let Some(bucket) = self.buckets.get_mut(&digest) {
            let before = bucket.handles.len();
            bucket.handles.retain(|h| !Arc::ptr_eq(h, handle));
            debug_assert_eq!(
                bucket.handles.len(),
                before - 1,
                "remove_handle called on a handle not present in its bucket"
            );
            remove_bucket = bucket.handles.is_empty();
        }
        if remove_bucket {
            self.buckets.remove(&digest);
        }
        handle.set_flag(HandleFlags::CLOSED, true);
    }

    /// Snapshot of every handle across every bucket, used by shutdown to drain the
    /// whole table without holding a lock the worker doesn't need in the first place.
    pub fn all_handles(&self) -> Vec<Arc<Handle>> {
        self.buckets
            .values()
            .flat_map(|b| b.handles.iter().cloned())
            .collect()
    }

    /// Number of *buckets*, not handles, matching the upstream `HandleCount` contract.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn digest(seed: u8) -> Digest {
        Digest::from_bytes([seed; 20])
    }

    #[test]
    fn new_handle_becomes_the_live_head() {
        let mut reg = Registry::with_capacity_hint(4);
        let h = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        assert!(reg.get_handle(digest(1)).unwrap().is_same_as(&h));
    }

    #[test]
    fn doomed_head_masks_the_bucket() {
        let mut reg = Registry::with_capacity_hint(4);
        let h = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        h.set_flag(HandleFlags::DOOMED, true);
        assert!(matches!(
            reg.get_handle(digest(1)),
            Err(CacheIoError::NotAvailable)
        ));
    }

    #[test]
    fn new_handle_after_dooming_coexists_and_becomes_head() {
        let mut reg = Registry::with_capacity_hint(4);
        let h1 = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        h1.set_flag(HandleFlags::DOOMED, true);
        let h2 = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        assert!(!h1.is_same_as(&h2));
        assert!(reg.get_handle(digest(1)).unwrap().is_same_as(&h2));
        assert_eq!(reg.bucket_count(), 1);
    }

    #[test]
    fn remove_handle_drops_empty_buckets() {
        let mut reg = Registry::with_capacity_hint(4);
        let h = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        reg.remove_handle(&h);
        assert_eq!(reg.bucket_count(), 0);
        assert!(h.is_closed());
    }

    #[test]
    fn remove_handle_keeps_bucket_while_sibling_remains() {
        let mut reg = Registry::with_capacity_hint(4);
        let h1 = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        h1.set_flag(HandleFlags::DOOMED, true);
        let h2 = reg.new_handle(digest(1), "/root/entries/AA".into(), false);
        reg.remove_handle(&h1);
        assert_eq!(reg.bucket_count(), 1);
        assert!(reg.get_handle(digest(1)).unwrap().is_same_as(&h2));
    }
}
