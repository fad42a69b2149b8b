//! Dump the text bodies of messages to disk for manual review.
//!
//! Layout: `{root}/{sender-domain}/{timestamp}{subject}.{txt,html}`, with
//! every non-alphanumeric character of the file stem replaced by `_`.
//! Files are overwritten on every run.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::model::message::Message;
use crate::parser::mime;

/// Files written for one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DumpedFiles {
    pub html: Option<PathBuf>,
    pub text: Option<PathBuf>,
}

impl DumpedFiles {
    pub fn count(&self) -> usize {
        usize::from(self.html.is_some()) + usize::from(self.text.is_some())
    }
}

/// A message whose payloads could not be dumped.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DumpFailure {
    pub sequence: u64,
    pub sender: String,
    pub subject: String,
    pub reason: String,
}

/// Outcome of dumping a batch of messages.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DumpSummary {
    /// Messages attempted.
    pub messages: usize,
    /// Files written (`.txt` plus `.html`).
    pub files_written: usize,
    /// Messages that had neither a `text/plain` nor a `text/html` part.
    pub without_text: usize,
    pub failures: Vec<DumpFailure>,
}

/// Replace every non-alphanumeric character with `_`.
///
/// Distinct inputs that differ only in punctuation map to the same name;
/// such collisions overwrite each other.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// File stem for a message: ISO timestamp followed by the subject, sanitized.
pub fn payload_filename(message: &Message) -> String {
    sanitize_filename(&format!(
        "{}{}",
        message.timestamp().to_iso(),
        message.subject()
    ))
}

/// Directory for a message's payloads: `{root}/{domain}`.
///
/// The domain must be a single plain path component.
pub fn payload_dir(root: &Path, domain: &str) -> Result<PathBuf> {
    let mut components = Path::new(domain).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !domain.contains(['/', '\\']) => {
            Ok(root.join(domain))
        }
        _ => Err(SyncError::InvalidPath(format!(
            "sender domain '{domain}' is not a usable directory name"
        ))),
    }
}

/// Write the `text/html` and `text/plain` payloads of a message.
///
/// The domain directory is created if needed. A message without text parts
/// writes nothing and is not an error.
pub fn dump(message: &Message, root: &Path) -> Result<DumpedFiles> {
    let body = mime::parse_body(&message.raw)?;
    let payloads = mime::text_payloads(&body);

    let dir = payload_dir(root, &message.domain)?;
    std::fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

    let stem = payload_filename(message);
    let mut files = DumpedFiles::default();

    if let Some(html) = payloads.get("text/html") {
        let path = dir.join(format!("{stem}.html"));
        std::fs::write(&path, html).map_err(|e| SyncError::io(&path, e))?;
        files.html = Some(path);
    }

    if let Some(text) = payloads.get("text/plain") {
        let path = dir.join(format!("{stem}.txt"));
        std::fs::write(&path, text).map_err(|e| SyncError::io(&path, e))?;
        files.text = Some(path);
    }

    debug!(
        sequence = message.sequence,
        files = files.count(),
        dir = %dir.display(),
        "Dumped payloads"
    );
    Ok(files)
}

/// Dump several messages, recording per-message failures instead of stopping.
///
/// Fails only if `root` itself cannot be created. The progress callback
/// receives `(current, total)`.
pub fn dump_all(
    messages: &[&Message],
    root: &Path,
    progress: &dyn Fn(usize, usize),
) -> Result<DumpSummary> {
    std::fs::create_dir_all(root).map_err(|e| SyncError::io(root, e))?;

    let total = messages.len();
    let mut summary = DumpSummary {
        messages: total,
        ..DumpSummary::default()
    };

    for (i, message) in messages.iter().enumerate() {
        progress(i, total);
        match dump(message, root) {
            Ok(files) if files.count() == 0 => summary.without_text += 1,
            Ok(files) => summary.files_written += files.count(),
            Err(e) => {
                warn!(
                    sequence = message.sequence,
                    sender = message.sender(),
                    error = %e,
                    "Failed to dump payloads"
                );
                summary.failures.push(DumpFailure {
                    sequence: message.sequence,
                    sender: message.sender().to_string(),
                    subject: message.subject().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    progress(total, total);

    Ok(summary)
}
