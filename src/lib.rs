//! `mboxsync`: import an MBOX archive into a SQLite store.
//!
//! Messages are deduplicated by (sender, date, subject). Their text bodies
//! can be dumped to `dump/<sender-domain>/` for manual review.

pub mod config;
pub mod error;
pub mod export;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod store;
pub mod sync;

pub use sync::{run, RunOptions, SyncReport};
