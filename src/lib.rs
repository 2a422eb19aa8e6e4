#![forbid(unsafe_code)]

//! A disk-backed, content-addressed cache I/O engine.
//!
//! Callers hash a string key into a [`digest::Digest`], open it through
//! [`dispatcher::Engine`], and get back a [`dispatcher::HandleRef`] they can read,
//! write, doom, or truncate. All filesystem and registry mutation happens on one
//! dedicated worker thread (see [`worker`]); everything else in this crate exists to
//! keep that thread the only writer.

mod config;
mod digest;
mod dispatcher;
mod error;
mod fdpool;
mod flags;
mod handle;
mod lifecycle;
mod listener;
mod path;
mod priority;
mod registry;
mod worker;

pub use config::CacheConfig;
pub use digest::Digest;
pub use dispatcher::{Engine, EntryIter, HandleRef};
pub use error::{CacheIoError, Result};
pub use flags::{EnumerateMode, OpenFlags};
pub use handle::Handle;
pub use lifecycle::{global, install_global};
pub use listener::{ChannelCompleter, Completer, InlineCompleter, Listener, NullListener};
pub use priority::PriorityClass;
