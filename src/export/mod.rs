//! Writing message payloads to disk.

pub mod payload;
