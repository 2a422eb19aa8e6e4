//! Priority classes for work submitted to the I/O worker.
//!
//! See SPEC_FULL.md §5: four FIFO sub-queues, drained highest-priority-first, with
//! `Close` reserved so shutdown's own drain work is always admitted.

/// Ordered highest-to-lowest; the worker scans variants in declaration order when
/// looking for the next runnable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityClass {
    /// `OPEN_PRIORITY` / `READ_PRIORITY` / `DOOM_PRIORITY` — entries flagged
    /// `PRIORITY` at open time.
    Elevated,
    /// `OPEN` / `READ` — the default tier.
    Normal,
    /// `WRITE` / non-priority `DOOM` — writes and background dooms.
    Background,
    /// Handle cleanup and `release_fd`; also the only class admitted while the
    /// engine is draining for shutdown.
    Close,
}

impl PriorityClass {
    pub(crate) const ALL: [PriorityClass; 4] = [
        PriorityClass::Elevated,
        PriorityClass::Normal,
        PriorityClass::Background,
        PriorityClass::Close,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            PriorityClass::Elevated => 0,
            PriorityClass::Normal => 1,
            PriorityClass::Background => 2,
            PriorityClass::Close => 3,
        }
    }
}
