//! Reconcile a mailbox with the store and run the full import pipeline.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::export::payload::{self, DumpSummary};
use crate::mailbox::{self, SkippedMessage};
use crate::model::message::{IdentityTuple, Message};
use crate::parser::mbox::MAX_MESSAGE_SIZE;
use crate::store::{NewRow, Store};

/// What a sync run found and did.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SyncReport {
    /// Size of the mailbox archive in bytes.
    pub mailbox_bytes: u64,
    /// Messages read from the mailbox with a usable identity.
    pub mailbox_messages: usize,
    /// Mailbox entries left out (bad date, no sender domain).
    pub skipped: Vec<SkippedMessage>,
    /// Distinct identities in the store before this run.
    pub stored_before: usize,
    /// Rows actually inserted by this run.
    pub inserted: usize,
    /// Identities in the mailbox but not (yet) in the store.
    pub only_in_mailbox: BTreeSet<IdentityTuple>,
    /// Identities in the store but not in the mailbox.
    pub only_in_store: BTreeSet<IdentityTuple>,
    /// Payload dump results, when dumping was enabled.
    pub dump: Option<DumpSummary>,
}

impl SyncReport {
    /// Whether every mailbox message was already stored before this run.
    pub fn mailbox_fully_stored(&self) -> bool {
        self.only_in_mailbox.is_empty()
    }
}

/// Inputs of [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mailbox: PathBuf,
    pub store: PathBuf,
    /// Root of the payload dump; `None` disables dumping.
    pub dump_dir: Option<PathBuf>,
    /// Dump only messages whose stored row has no receipt linked.
    pub pending_only: bool,
    pub max_message_size: usize,
}

impl RunOptions {
    pub fn new(mailbox: impl Into<PathBuf>, store: impl Into<PathBuf>) -> Self {
        Self {
            mailbox: mailbox.into(),
            store: store.into(),
            dump_dir: None,
            pending_only: true,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }
}

/// Compare mailbox identities with the store without changing anything.
pub fn compare(messages: &[Message], store: &Store) -> Result<SyncReport> {
    let stored = store.identities()?;
    let in_mailbox: BTreeSet<IdentityTuple> =
        messages.iter().map(|m| m.identity.clone()).collect();

    let only_in_mailbox: BTreeSet<IdentityTuple> =
        in_mailbox.difference(&stored).cloned().collect();
    let only_in_store: BTreeSet<IdentityTuple> =
        stored.difference(&in_mailbox).cloned().collect();

    if only_in_mailbox.is_empty() {
        info!("All mailbox messages are in the store already");
    } else {
        info!(count = only_in_mailbox.len(), "Messages not yet in the store");
    }
    if !only_in_store.is_empty() {
        info!(count = only_in_store.len(), "Stored messages missing from the mailbox");
    }

    Ok(SyncReport {
        mailbox_messages: messages.len(),
        stored_before: stored.len(),
        only_in_mailbox,
        only_in_store,
        ..SyncReport::default()
    })
}

/// Insert every mailbox message into the store unless already present.
///
/// All inserts are attempted (in identity order) inside one transaction;
/// duplicates are skipped by the store. Payloads are not dumped here.
pub fn sync(messages: &[Message], store: &mut Store) -> Result<SyncReport> {
    let mut report = compare(messages, store)?;

    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by(|a, b| a.identity.cmp(&b.identity));

    report.inserted = store.insert_if_absent(ordered.into_iter().map(NewRow::from))?;
    info!(inserted = report.inserted, "Store updated");
    Ok(report)
}

/// Load the mailbox, sync it into the store, then dump payloads.
pub fn run(options: &RunOptions) -> Result<SyncReport> {
    run_with_progress(options, &|_, _| {})
}

/// [`run`], reporting dump progress as `(current, total)`.
///
/// The mailbox is read completely before the store is opened, so a missing
/// or unreadable mailbox never touches the store.
pub fn run_with_progress(
    options: &RunOptions,
    progress: &dyn Fn(usize, usize),
) -> Result<SyncReport> {
    let mailbox = mailbox::load_with_limit(&options.mailbox, options.max_message_size)?;
    let mut store = Store::open(&options.store)?;

    let mut report = sync(&mailbox.messages, &mut store)?;
    report.mailbox_bytes = mailbox.file_size;
    report.skipped = mailbox.skipped.clone();

    if let Some(dump_dir) = &options.dump_dir {
        let selected: Vec<&Message> = if options.pending_only {
            let pending = store.pending_identities()?;
            mailbox
                .sorted_messages()
                .into_iter()
                .filter(|m| pending.contains(&m.identity))
                .collect()
        } else {
            mailbox.sorted_messages()
        };
        info!(
            count = selected.len(),
            dir = %dump_dir.display(),
            "Dumping payloads"
        );
        report.dump = Some(payload::dump_all(&selected, dump_dir, progress)?);
    }

    store.close()?;
    Ok(report)
}

/// Load the mailbox and compare it with the store; nothing is written.
pub fn status(options: &RunOptions) -> Result<SyncReport> {
    let mailbox = mailbox::load_with_limit(&options.mailbox, options.max_message_size)?;
    let store = Store::open(&options.store)?;
    let mut report = compare(&mailbox.messages, &store)?;
    report.mailbox_bytes = mailbox.file_size;
    report.skipped = mailbox.skipped;
    Ok(report)
}
