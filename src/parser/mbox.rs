//! Streaming MBOX parser.
//!
//! Reads MBOX files line-by-line through a large buffer and hands each
//! message to a callback. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Streaming MBOX parser.
///
/// Every line starting with `From ` opens a new message. The parser is
/// tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
///
/// The blank line in front of a separator is treated as part of the
/// separator, so it is not passed on as the last line of the previous message.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists, but does NOT validate that it is
    /// actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| SyncError::open(&path, e))?;
        if metadata.is_dir() {
            return Err(SyncError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
            ));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Override the per-message size cap.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the full MBOX, calling `message_callback` for each message found.
    ///
    /// The callback receives `(offset, raw_bytes)` where `raw_bytes` starts
    /// with the `From ` separator line. It returns `true` to continue or
    /// `false` to stop early.
    ///
    /// Returns the number of messages delivered.
    pub fn parse(&self, message_callback: &mut dyn FnMut(u64, &[u8]) -> bool) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| SyncError::open(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start: u64 = 0;
        let mut prev_line_len: usize = 0;
        let mut prev_ended_line = true;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut in_message = false;
        let mut skipped_preamble: u64 = 0;
        let mut truncated = false;

        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| SyncError::io(&self.path, e))?;
                if buf.is_empty() {
                    break; // EOF
                }
                let consume_len = match memchr_newline(buf) {
                    Some(pos) => pos + 1,
                    None => buf.len(),
                };
                line_buf.extend_from_slice(&buf[..consume_len]);
                reader.consume(consume_len);
                consume_len
            };

            // A line longer than the read buffer arrives in pieces; only the
            // first piece can be a separator.
            if prev_ended_line && is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !message_buf.is_empty() {
                    if prev_line_was_empty && !truncated {
                        message_buf.truncate(message_buf.len() - prev_line_len);
                    }
                    if !message_callback(message_start, &message_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = current_offset;
                message_buf.clear();
                message_buf.extend_from_slice(&line_buf);
                in_message = true;
                truncated = false;
            } else if !in_message {
                // Anything before the first separator is not a message.
                skipped_preamble += line_len as u64;
            } else if !truncated && message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            prev_line_len = line_len;
            prev_ended_line = line_buf.ends_with(b"\n");
            first_line = false;
            current_offset += line_len as u64;
        }

        if skipped_preamble > 0 {
            debug!(bytes = skipped_preamble, "Ignored text before the first separator");
        }

        // Flush last message
        if !message_buf.is_empty() && message_callback(message_start, &message_buf) {
            count += 1;
        }

        Ok(count)
    }
}

/// Fast newline search.
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

/// Strip the leading `From ` separator line, returning the RFC 5322 message.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = memchr_newline(data) {
            return &data[pos + 1..];
        }
        return &[];
    }
    data
}

/// Byte range of the header block: everything before the first blank line.
pub fn header_block(data: &[u8]) -> &[u8] {
    if data.starts_with(b"\n") || data.starts_with(b"\r\n") {
        return &[];
    }
    for (i, _) in data.iter().enumerate().filter(|(_, &b)| b == b'\n') {
        let rest = &data[i + 1..];
        if rest.starts_with(b"\n") || rest.starts_with(b"\r\n") {
            return &data[..=i];
        }
    }
    data
}
