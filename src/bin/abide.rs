//! # Abide CLI - inspect and maintain snapshot files
//!
//! ## Usage
//! ```bash
//! # List snapshots under ./__snapshots__
//! abide list
//!
//! # Print one snapshot
//! abide show "first route"
//!
//! # Report unreadable files, duplicate ids and non-canonical files
//! abide check
//!
//! # Rewrite every file in canonical form
//! abide fmt
//!
//! # Delete a snapshot
//! abide remove "first route"
//! ```

use abide::codec;
use abide::scanner::{self, LoadReport};
use abide::store::{self, SnapshotStore};
use abide::{AbideError, SNAPSHOTS_DIR};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Abide CLI - snapshot file maintenance
#[derive(Parser)]
#[command(name = "abide")]
#[command(version)]
#[command(about = "Inspect and maintain abide snapshot files")]
#[command(long_about = None)]
struct Cli {
    /// Grouping root containing __snapshots__ (defaults to current directory)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List snapshot ids
    #[command(alias = "ls")]
    List {
        /// Show the file each snapshot lives in
        #[arg(short, long)]
        files: bool,
    },

    /// Print a snapshot value
    Show {
        /// Snapshot id
        id: String,
    },

    /// Report load problems and files not in canonical form
    Check,

    /// Rewrite snapshot files in canonical form
    Fmt,

    /// Delete a snapshot
    #[command(alias = "rm")]
    Remove {
        /// Snapshot id
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// Main command runner; `Ok(false)` means a check failed
fn run(cli: Cli) -> Result<bool> {
    let root = cli.path.unwrap_or_else(|| PathBuf::from("."));
    let dir = root.join(SNAPSHOTS_DIR);
    if !dir.is_dir() {
        bail!("no snapshot directory at {}", dir.display());
    }

    match cli.command {
        Commands::List { files } => cmd_list(&dir, files),
        Commands::Show { id } => cmd_show(&dir, &id),
        Commands::Check => cmd_check(&dir),
        Commands::Fmt => cmd_fmt(&dir),
        Commands::Remove { id } => cmd_remove(&dir, &id),
    }
}

fn load(dir: &Path) -> Result<LoadReport> {
    scanner::load_all(dir, num_cpus::get())
        .with_context(|| format!("loading snapshots from {}", dir.display()))
}

fn cmd_list(dir: &Path, files: bool) -> Result<bool> {
    let report = load(dir)?;
    let store = SnapshotStore::from_report(dir.to_path_buf(), "", report);

    for snapshot in store.snapshots() {
        let lines = snapshot.value.lines().count();
        if files {
            let file = snapshot
                .path
                .as_deref()
                .and_then(Path::file_name)
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("{}  {}  {}", snapshot.id.to_string().bold(), file.dimmed(), format!("{} lines", lines).dimmed());
        } else {
            println!("{}  {}", snapshot.id.to_string().bold(), format!("{} lines", lines).dimmed());
        }
    }

    println!("\n{} snapshots", store.len());
    Ok(true)
}

fn cmd_show(dir: &Path, id: &str) -> Result<bool> {
    let report = load(dir)?;
    match report.snapshots.get(id) {
        Some(snapshot) => {
            println!("{}", snapshot.value);
            Ok(true)
        }
        None => Err(AbideError::SnapshotNotFound(id.to_string()).into()),
    }
}

fn cmd_check(dir: &Path) -> Result<bool> {
    let report = load(dir)?;
    let mut clean = true;

    for warning in &report.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
        clean = false;
    }

    for file in &report.files {
        let Ok(data) = fs::read(file) else { continue };
        let canonical = codec::encode(codec::decode(&data).values());
        if canonical != data {
            println!("{} {} is not in canonical form", "warning:".yellow().bold(), file.display());
            clean = false;
        }
    }

    if clean {
        println!("{} {} snapshots in {} files", "✓".green(), report.snapshots.len(), report.files.len());
    }
    Ok(clean)
}

fn cmd_fmt(dir: &Path) -> Result<bool> {
    let files = scanner::snapshot_files(dir)?;
    let mut rewritten = 0;

    for file in &files {
        let data = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let decoded = codec::decode_with_report(&data);
        // Rewriting would drop whatever could not be parsed
        if !decoded.discarded.is_empty() {
            println!("{} {} has unparsed content, skipped", "warning:".yellow().bold(), file.display());
            continue;
        }
        let canonical = codec::encode(decoded.snapshots.values());
        if canonical != data {
            store::write_file(file, &canonical)?;
            println!("{} {}", "formatted".green(), file.display());
            rewritten += 1;
        }
    }

    println!("{} of {} files rewritten", rewritten, files.len());
    Ok(true)
}

fn cmd_remove(dir: &Path, id: &str) -> Result<bool> {
    let report = load(dir)?;
    let store = SnapshotStore::from_report(dir.to_path_buf(), "", report);

    match store.remove(id)? {
        Some(_) => {
            println!("{} `{}`", "Removed".green(), id);
            Ok(true)
        }
        None => Err(AbideError::SnapshotNotFound(id.to_string()).into()),
    }
}
