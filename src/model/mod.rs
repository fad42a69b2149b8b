//! Core data model: messages, identity keys, timestamps and sender addresses.

pub mod address;
pub mod message;
pub mod timestamp;
