//! CLI entry point for `mboxsync`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxsync::config::Config;
use mboxsync::export::payload::{self, DumpSummary};
use mboxsync::store::Store;
use mboxsync::sync::{self, RunOptions, SyncReport};

/// Import an MBOX archive into a SQLite store and dump message bodies for review.
#[derive(Parser)]
#[command(name = "mboxsync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MBOX archive (default from config: receipts.mbox)
    #[arg(long, global = true, value_name = "FILE")]
    mailbox: Option<PathBuf>,

    /// SQLite store (default from config: receipts.db)
    #[arg(long, global = true, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Payload dump directory (default from config: dump)
    #[arg(long, global = true, value_name = "DIR")]
    dump_dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the mailbox into the store, then dump pending payloads (default)
    Sync {
        /// Do not dump payloads
        #[arg(long)]
        no_dump: bool,
        /// Dump every message, not only those without a receipt
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Compare the mailbox with the store without writing anything
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Dump payloads of every mailbox message without touching the store
    Dump,
    /// Create the store and its `emails` table if they do not exist
    InitStore,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mboxsync::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let mailbox = cli.mailbox.unwrap_or_else(|| config.paths.mailbox.clone());
    let store = cli.store.unwrap_or_else(|| config.paths.store.clone());
    let dump_dir = cli.dump_dir.unwrap_or_else(|| config.paths.dump_dir.clone());

    let mut options = RunOptions::new(mailbox, store);
    options.pending_only = config.dump.pending_only;
    options.max_message_size = config.performance.max_message_size;
    if config.dump.enabled {
        options.dump_dir = Some(dump_dir.clone());
    }

    match cli.command {
        None => cmd_sync(options, false),
        Some(Commands::Sync { no_dump, all, json }) => {
            if no_dump {
                options.dump_dir = None;
            } else if options.dump_dir.is_none() && all {
                options.dump_dir = Some(dump_dir);
            }
            if all {
                options.pending_only = false;
            }
            cmd_sync(options, json)
        }
        Some(Commands::Status { json }) => cmd_status(&options, json),
        Some(Commands::Dump) => cmd_dump(&options.mailbox, &dump_dir, options.max_message_size),
        Some(Commands::InitStore) => cmd_init_store(&options.store),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = mboxsync::config::log_file_path(config);
    let log_dir = mboxsync::config::cache_dir(config);
    let file_name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mboxsync.log".into());

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

/// Run the full pipeline and print the report.
fn cmd_sync(options: RunOptions, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let pb = progress_bar(0, "Dumping");

    let report = sync::run_with_progress(&options, &|current, total| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    })?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&options, &report, start.elapsed());
    }
    Ok(())
}

/// Compare only.
fn cmd_status(options: &RunOptions, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let report = sync::status(options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(options, &report, start.elapsed());
        print_differences(&report);
    }
    Ok(())
}

/// Dump every message in the mailbox.
fn cmd_dump(mailbox_path: &Path, dump_dir: &Path, max_message_size: usize) -> anyhow::Result<()> {
    let mailbox = mboxsync::mailbox::load_with_limit(mailbox_path, max_message_size)?;
    let messages = mailbox.sorted_messages();

    let pb = progress_bar(messages.len() as u64, "Dumping");
    let summary = payload::dump_all(&messages, dump_dir, &|current, _total| {
        pb.set_position(current as u64);
    })?;
    pb.finish_and_clear();

    println!();
    print_dump_summary(&summary, dump_dir);
    println!();
    Ok(())
}

fn cmd_init_store(path: &Path) -> anyhow::Result<()> {
    let store = Store::create(path)?;
    println!(
        "  Store ready at {} ({} row(s))",
        store.path().display(),
        store.row_count()?
    );
    store.close()?;
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxsync", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print a run report as a human-readable table.
fn print_report(options: &RunOptions, report: &SyncReport, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<25} {}", "Mailbox", options.mailbox.display());
    println!(
        "  {:<25} {}",
        "Mailbox size",
        format_size(report.mailbox_bytes, BINARY)
    );
    println!("  {:<25} {}", "Messages", report.mailbox_messages);
    println!("  {:<25} {}", "Skipped", report.skipped.len());
    println!("  {:<25} {}", "Store", options.store.display());
    println!("  {:<25} {}", "Stored before", report.stored_before);
    println!("  {:<25} {}", "Not yet stored", report.only_in_mailbox.len());
    println!("  {:<25} {}", "Only in store", report.only_in_store.len());
    println!("  {:<25} {}", "Inserted", report.inserted);
    println!("  {:<25} {:.2?}", "Time", elapsed);

    if !report.skipped.is_empty() {
        println!();
        println!("  Skipped messages:");
        for skipped in &report.skipped {
            println!("    #{:<6} {}", skipped.sequence, skipped.reason);
        }
    }

    if let Some(summary) = &report.dump {
        if let Some(dir) = &options.dump_dir {
            println!();
            print_dump_summary(summary, dir);
        }
    }
    println!();
}

fn print_differences(report: &SyncReport) {
    for (title, set) in [
        ("Not yet stored", &report.only_in_mailbox),
        ("Only in store", &report.only_in_store),
    ] {
        if set.is_empty() {
            continue;
        }
        println!("  {title}:");
        for identity in set {
            let subject: String = identity.subject.chars().take(50).collect();
            println!(
                "    {:<25} {:<30} {}",
                identity.timestamp.to_iso(),
                identity.sender,
                subject
            );
        }
        println!();
    }
}

fn print_dump_summary(summary: &DumpSummary, dir: &Path) {
    println!("  {:<25} {}", "Dump directory", dir.display());
    println!("  {:<25} {}", "Messages dumped", summary.messages);
    println!("  {:<25} {}", "Files written", summary.files_written);
    println!("  {:<25} {}", "Without text parts", summary.without_text);
    println!("  {:<25} {}", "Failed", summary.failures.len());
    for failure in &summary.failures {
        println!(
            "    #{:<6} {} {:?}: {}",
            failure.sequence, failure.sender, failure.subject, failure.reason
        );
    }
}
