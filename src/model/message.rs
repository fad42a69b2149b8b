//! Messages read from the mailbox, their identity key and their body tree.

use super::timestamp::Timestamp;

/// Natural deduplication key: two messages are the same iff sender,
/// timestamp and subject all compare equal.
///
/// Field order is the sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct IdentityTuple {
    /// Bare sender address.
    pub sender: String,
    /// Parsed `Date:` header.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: Timestamp,
    /// Raw subject, empty when absent.
    pub subject: String,
}

fn serialize_timestamp<S: serde::Serializer>(
    ts: &Timestamp,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_iso())
}

impl std::fmt::Display for IdentityTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {:?}", self.timestamp, self.sender, self.subject)
    }
}

/// A single message from the mailbox archive.
///
/// The body is kept as raw bytes and decoded on demand with
/// [`crate::parser::mime::parse_body`], so a message with broken MIME still
/// takes part in synchronization.
#[derive(Debug, Clone)]
pub struct Message {
    /// Identity key derived from the headers.
    pub identity: IdentityTuple,

    /// Domain part of the sender (text after `@`).
    pub domain: String,

    /// Position of the message in the archive (0, 1, 2, …).
    pub sequence: u64,

    /// Raw message bytes without the `From ` separator line.
    pub raw: Vec<u8>,
}

impl Message {
    pub fn sender(&self) -> &str {
        &self.identity.sender
    }

    pub fn timestamp(&self) -> Timestamp {
        self.identity.timestamp
    }

    pub fn subject(&self) -> &str {
        &self.identity.subject
    }
}

/// Decoded body of a message: a tree of MIME parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A non-multipart part with its content type and transfer-decoded bytes.
    Leaf { content_type: String, bytes: Vec<u8> },
    /// A multipart container (or embedded message) with its children in order.
    Composite { parts: Vec<Body> },
}

impl Body {
    pub fn leaf(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Body::Leaf {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn composite(parts: Vec<Body>) -> Self {
        Body::Composite { parts }
    }
}
