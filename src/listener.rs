//! The callback contract callers implement, and the `Completer` capability the engine
//! uses to deliver a finished operation back to it.
//!
//! No direct teacher analog: `posy`'s stores are entirely synchronous call-and-return.
//! This is new code written to satisfy the "abstract this as a Completer capability
//! accepting a callable" design note in SPEC_FULL.md §9.

use std::fmt;
use std::sync::mpsc;

use crate::dispatcher::HandleRef;
use crate::error::Result;

/// Callbacks the engine invokes, through a [`Completer`], once a requested operation
/// has run on the worker thread. Every method has a no-op default so callers only
/// implement what they need.
pub trait Listener: Send + 'static {
    fn on_file_opened(&self, _result: Result<HandleRef>) {}
    fn on_data_read(&self, _handle: HandleRef, _result: Result<Vec<u8>>) {}
    fn on_data_written(&self, _handle: HandleRef, _result: Result<usize>) {}
    /// `handle` is `None` when the doom targeted a key with no live handle.
    fn on_file_doomed(&self, _handle: Option<HandleRef>, _result: Result<()>) {}
    fn on_eof_set(&self, _handle: HandleRef, _result: Result<()>) {}
}

/// A `Listener` that does nothing, for callers that only care about a result they'll
/// observe some other way (a `ChannelCompleter`'s receiver, a shared `Mutex`, etc).
pub struct NullListener;
impl Listener for NullListener {}

/// Delivers a finished operation's completion closure. Abstracts over "run it right
/// here" (the default, and what tests use) and "hand it to whatever event loop the
/// caller's thread is running".
pub trait Completer: Send + Sync + 'static {
    fn post(&self, job: Box<dyn FnOnce() + Send>);
}

impl fmt::Debug for dyn Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Completer")
    }
}

/// Runs the completion immediately, on whatever thread calls `post` (in practice, the
/// worker thread itself). This is the engine's default and is adequate for callers
/// that don't need completions marshalled onto a specific thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineCompleter;

impl Completer for InlineCompleter {
    fn post(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// Hands completions off to an `mpsc` channel for a caller-owned event loop to drain
/// at its own pace, the way a GUI toolkit's main loop would pump a queue of posted
/// callbacks.
#[derive(Clone)]
pub struct ChannelCompleter {
    sender: mpsc::Sender<Box<dyn FnOnce() + Send>>,
}

impl ChannelCompleter {
    /// Returns a completer and the receiving half; the caller is responsible for
    /// periodically calling `pump`/`pump_blocking` on the receiver from its own
    /// thread.
    pub fn new() -> (ChannelCompleter, mpsc::Receiver<Box<dyn FnOnce() + Send>>) {
        let (sender, receiver) = mpsc::channel();
        (ChannelCompleter { sender }, receiver)
    }
}

impl Completer for ChannelCompleter {
    fn post(&self, job: Box<dyn FnOnce() + Send>) {
        // If the receiver has been dropped, there's no one left to deliver the
        // completion to; that's the caller's choice to make, not an engine error.
        let _ = self.sender.send(job);
    }
}

/// Runs every completion currently queued on `receiver`, in order. Returns the number
/// of completions run.
pub fn pump(receiver: &mpsc::Receiver<Box<dyn FnOnce() + Send>>) -> usize {
    let mut n = 0;
    while let Ok(job) = receiver.try_recv() {
        job();
        n += 1;
    }
    n
}

/// Blocks until at least one completion is available, then runs every completion
/// currently queued.
pub fn pump_blocking(receiver: &mpsc::Receiver<Box<dyn FnOnce() + Send>>) -> usize {
    match receiver.recv() {
        Ok(job) => job(),
        Err(_) => return 0,
    }
    1 + pump(receiver)
}
