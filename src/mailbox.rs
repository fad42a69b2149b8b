//! Mailbox loading: every archived message with its identity key.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::message::{IdentityTuple, Message};
use crate::parser::header::IdentityHeaders;
use crate::parser::mbox::{self, MboxParser, MAX_MESSAGE_SIZE};

/// A message that was left out of synchronization, and why.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkippedMessage {
    /// Position in the archive.
    pub sequence: u64,
    /// Byte offset of the `From ` separator.
    pub offset: u64,
    /// Human-readable reason.
    pub reason: String,
}

/// All messages of one mailbox archive, in archive order.
#[derive(Debug, Default)]
pub struct Mailbox {
    pub messages: Vec<Message>,
    /// Entries whose identity could not be derived (bad date, no sender domain).
    pub skipped: Vec<SkippedMessage>,
    /// Size of the archive in bytes.
    pub file_size: u64,
}

impl Mailbox {
    /// Identity tuples sorted by (sender, timestamp, subject).
    ///
    /// The sort is stable, so equal tuples keep archive order.
    pub fn sorted_identities(&self) -> Vec<&IdentityTuple> {
        let mut identities: Vec<&IdentityTuple> =
            self.messages.iter().map(|m| &m.identity).collect();
        identities.sort();
        identities
    }

    /// Messages sorted by identity, ties in archive order.
    pub fn sorted_messages(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.iter().collect();
        messages.sort_by(|a, b| a.identity.cmp(&b.identity));
        messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Load a single-file MBOX archive with the default message size cap.
pub fn load(path: impl AsRef<Path>) -> Result<Mailbox> {
    load_with_limit(path, MAX_MESSAGE_SIZE)
}

/// Load a single-file MBOX archive.
///
/// Fails if the file is missing or unreadable. Messages whose date cannot be
/// parsed, or whose sender has no domain, are recorded in
/// [`Mailbox::skipped`] instead of failing the load.
pub fn load_with_limit(path: impl AsRef<Path>, max_message_size: usize) -> Result<Mailbox> {
    let parser = MboxParser::new(path)?.with_max_message_size(max_message_size);
    info!(path = %parser.path().display(), size = parser.file_size(), "Loading mailbox");

    let mut mailbox = Mailbox {
        file_size: parser.file_size(),
        ..Mailbox::default()
    };
    let mut sequence: u64 = 0;

    parser.parse(&mut |offset, bytes| {
        let raw = mbox::skip_from_line(bytes);
        let headers = IdentityHeaders::parse(mbox::header_block(raw));
        match headers.identity() {
            Ok((identity, domain)) => {
                debug!(sequence, %identity, "Read message");
                mailbox.messages.push(Message {
                    identity,
                    domain,
                    sequence,
                    raw: raw.to_vec(),
                });
            }
            Err(e) => {
                warn!(sequence, offset, error = %e, "Skipping message");
                mailbox.skipped.push(SkippedMessage {
                    sequence,
                    offset,
                    reason: e.to_string(),
                });
            }
        }
        sequence += 1;
        true
    })?;

    info!(
        messages = mailbox.messages.len(),
        skipped = mailbox.skipped.len(),
        "Mailbox loaded"
    );
    Ok(mailbox)
}
