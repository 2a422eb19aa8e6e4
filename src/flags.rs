//! Flag sets for the public dispatcher surface.
//!
//! Shaped after `kvstore.rs`'s `LockMode` enum upstream (a small closed type selecting
//! an on-disk access mode), generalized to a bit set since `OpenFlags` combines an
//! exclusive mode selector with independent modifier bits.

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by [`crate::dispatcher::Engine::open_file`].
    ///
    /// Exactly one of `OPEN`, `CREATE`, `CREATE_NEW` must be set; `PRIORITY` and
    /// `NOHASH` are independent modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Fail with `NotAvailable` unless a live handle or on-disk file exists.
        const OPEN = 0b0000_0001;
        /// Create if missing, else adopt the existing live handle or on-disk file.
        const CREATE = 0b0000_0010;
        /// Doom any live handle and start a fresh, empty entry.
        const CREATE_NEW = 0b0000_0100;
        /// Dispatch subsequent reads/dooms against this handle at the elevated
        /// priority tier.
        const PRIORITY = 0b0000_1000;
        /// Treat `key` as a literal 40-character hex digest instead of hashing it.
        const NOHASH = 0b0001_0000;
    }
}

impl OpenFlags {
    fn mode_bits() -> OpenFlags {
        OpenFlags::OPEN | OpenFlags::CREATE | OpenFlags::CREATE_NEW
    }

    /// Validates that exactly one mode bit is set, returning it in isolation.
    pub(crate) fn mode(&self) -> Option<OpenFlags> {
        let mode = *self & Self::mode_bits();
        match mode {
            OpenFlags::OPEN | OpenFlags::CREATE | OpenFlags::CREATE_NEW => Some(mode),
            _ => None,
        }
    }

    pub fn is_priority(&self) -> bool {
        self.contains(OpenFlags::PRIORITY)
    }

    pub fn is_nohash(&self) -> bool {
        self.contains(OpenFlags::NOHASH)
    }
}

/// Which on-disk tree [`crate::dispatcher::Engine::enumerate_entry_files`] walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerateMode {
    Entries,
    Doomed,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exactly_one_mode_bit_required() {
        assert_eq!(OpenFlags::OPEN.mode(), Some(OpenFlags::OPEN));
        assert_eq!(
            (OpenFlags::OPEN | OpenFlags::PRIORITY).mode(),
            Some(OpenFlags::OPEN)
        );
        assert_eq!((OpenFlags::OPEN | OpenFlags::CREATE).mode(), None);
        assert_eq!(OpenFlags::PRIORITY.mode(), None);
    }
}
