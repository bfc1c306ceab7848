use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use track_dedupe::matcher::LibraryIndex;
use track_dedupe::metadata::{read_entry_lossy, verify_entries};
use track_dedupe::models::{DuplicateGroup, LibraryEntry, ScanStats};
use track_dedupe::normalize::Normalizer;
use track_dedupe::progress::{format_duration, set_log_only};
use track_dedupe::resolve::{apply, decide, DuplicateHandling, Outcome};
use track_dedupe::rules::{RuleCatalog, VersionPolicy};
use track_dedupe::scanner::{scan_library, ScanOptions};

#[derive(Parser)]
#[command(name = "track-dedupe")]
#[command(about = "Find duplicate tracks in a music library by normalized artist and title")]
struct Args {
    /// Rule catalog JSON (defaults to the built-in catalog)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Override the catalog's version policy
    #[arg(long, value_enum, global = true)]
    policy: Option<VersionPolicy>,

    /// Log-only mode: no progress bars, periodic log lines (for background runs)
    #[arg(long, global = true)]
    log_only: bool,

    #[arg(long, default_value = "0", global = true)]
    workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a library and report duplicate groups
    Scan {
        library: PathBuf,

        #[arg(long)]
        recursive: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Write scan stats to a JSON file
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },
    /// Check one file against a library and resolve any duplicate
    Check {
        file: PathBuf,

        #[arg(long)]
        library: PathBuf,

        #[arg(long, value_enum, default_value = "interactive")]
        handling: DuplicateHandling,

        #[arg(long)]
        recursive: bool,
    },
    /// List library files with missing tags or junk in their tags
    Verify {
        library: PathBuf,

        #[arg(long)]
        recursive: bool,

        #[arg(long)]
        json: bool,
    },
    /// Print the canonical key for an artist/title pair
    Normalize {
        #[arg(long)]
        artist: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Print the effective rule catalog as JSON
    Rules,
}

#[derive(Serialize)]
struct ScanReport<'a> {
    library: &'a Path,
    duplicate_groups: &'a [DuplicateGroup],
    untagged: Vec<&'a Path>,
    stats: &'a ScanStats,
}

fn load_catalog(path: Option<&Path>, policy: Option<VersionPolicy>) -> Result<RuleCatalog> {
    let catalog = match path {
        Some(path) => RuleCatalog::load(path)?,
        None => RuleCatalog::builtin(),
    };
    Ok(match policy {
        Some(policy) => catalog.with_policy(policy),
        None => catalog,
    })
}

fn run_scan(
    normalizer: Normalizer,
    library: &Path,
    recursive: bool,
    json: bool,
    stats_out: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let mut stats = ScanStats::default();

    let entries = scan_library(library, ScanOptions { recursive }, &mut stats)?;
    let index = LibraryIndex::build(normalizer, entries.iter().cloned());
    let groups = index.duplicate_groups();

    stats.distinct_keys = index.len();
    stats.record_groups(&groups);
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("scan");

    let untagged: Vec<&Path> = entries
        .iter()
        .filter(|e| e.tag.missing_fields().any())
        .map(|e| e.path.as_path())
        .collect();

    if json {
        let report = ScanReport {
            library,
            duplicate_groups: &groups,
            untagged,
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for group in &groups {
            println!("\n{} ({} files)", group.key, group.files.len());
            for file in &group.files {
                println!("  {}", file.display());
            }
        }
        if !untagged.is_empty() {
            println!("\nMissing artist or title ({} files):", untagged.len());
            for path in &untagged {
                println!("  {}", path.display());
            }
        }

        println!("\n{:=<60}", "");
        println!("Scan complete!");
        println!("  Files: {}", stats.files_found);
        println!("  Unreadable: {}", stats.files_unreadable);
        println!("  Distinct keys: {}", stats.distinct_keys);
        println!(
            "  Duplicate groups: {} ({} files)",
            stats.duplicate_groups, stats.duplicate_files
        );
        println!("  Elapsed: {}", format_duration(start.elapsed()));
        println!("{:=<60}", "");
    }

    if let Some(path) = stats_out {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        eprintln!("Stats written to {}", path.display());
    }

    Ok(())
}

/// Files listed per section before "... and N more".
const VERIFY_LISTED: usize = 10;

fn print_entries(heading: &str, entries: &[LibraryEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("{} ({} files):", heading, entries.len());
    for entry in entries.iter().take(VERIFY_LISTED) {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.path.display().to_string());
        println!("  {}", name);
        println!("    Artist: {}", entry.tag.artist.as_deref().unwrap_or("(missing)"));
        println!("    Title: {}", entry.tag.title.as_deref().unwrap_or("(missing)"));
    }
    if entries.len() > VERIFY_LISTED {
        println!("  ... and {} more", entries.len() - VERIFY_LISTED);
    }
    println!();
}

fn run_verify(normalizer: Normalizer, library: &Path, recursive: bool, json: bool) -> Result<()> {
    let mut stats = ScanStats::default();
    let entries = scan_library(library, ScanOptions { recursive }, &mut stats)?;
    let report = verify_entries(&normalizer, &entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Verifying metadata in {}...\n", library.display());
    print_entries("Missing metadata", &report.missing);
    print_entries("Junk in metadata", &report.junk);
    if report.is_clean() {
        println!("All {} tracks have clean metadata", entries.len());
    }
    Ok(())
}

fn run_check(
    normalizer: Normalizer,
    file: &Path,
    library: &Path,
    handling: DuplicateHandling,
    recursive: bool,
) -> Result<()> {
    if !file.is_file() {
        bail!("File not found: {}", file.display());
    }

    let incoming = read_entry_lossy(file);
    let mut stats = ScanStats::default();
    let entries = scan_library(library, ScanOptions { recursive }, &mut stats)?;
    let mut index = LibraryIndex::build(normalizer, entries);

    let key = index.normalizer().normalize_tag(&incoming.tag);
    println!("Checking {} as \"{}\"", file.display(), key);

    let (basis, conflicts) = index.find_conflicts(&incoming);
    let Some(basis) = basis else {
        println!("No duplicate found in {}", library.display());
        return Ok(());
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let resolution = decide(handling, &incoming, basis, &conflicts, &mut input, &mut output)?;

    match apply(&mut index, resolution, &incoming, &conflicts, library)? {
        Outcome::Skipped => println!("Skipped {} (duplicate by {})", file.display(), basis),
        Outcome::Added(key) => println!("Kept both; \"{}\" now has {} files", key, conflicts.len() + 1),
        Outcome::Replaced { key, removed } => {
            println!("Replaced {} file(s) for \"{}\":", removed.len(), key);
            for path in &removed {
                println!("  removed {}", path.display());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let catalog = load_catalog(args.rules.as_deref(), args.policy)?;

    let normalizer = Normalizer::new(&catalog).context("Failed to compile rule catalog")?;

    match args.command {
        Command::Scan {
            library,
            recursive,
            json,
            stats_out,
        } => run_scan(normalizer, &library, recursive, json, stats_out.as_deref()),
        Command::Check {
            file,
            library,
            handling,
            recursive,
        } => run_check(normalizer, &file, &library, handling, recursive),
        Command::Verify {
            library,
            recursive,
            json,
        } => run_verify(normalizer, &library, recursive, json),
        Command::Normalize { artist, title, json } => {
            let key = normalizer.normalize(artist.as_deref(), title.as_deref());
            if json {
                println!("{}", serde_json::to_string_pretty(&key)?);
            } else {
                println!("artist: {}", key.artist);
                println!("title:  {}", key.title);
            }
            Ok(())
        }
        Command::Rules => {
            println!("{}", catalog.to_json()?);
            Ok(())
        }
    }
}
