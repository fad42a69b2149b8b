//! Email parsing: MBOX streaming parser, identity headers, and MIME body decoding.

pub mod header;
pub mod mbox;
pub mod mime;
