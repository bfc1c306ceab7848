//! Compare the built-in rule catalog against an alternative one on a real
//! library: which keys change and how the duplicate groups move.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use track_dedupe::matcher::LibraryIndex;
use track_dedupe::models::{LibraryEntry, ScanStats};
use track_dedupe::normalize::Normalizer;
use track_dedupe::progress::set_log_only;
use track_dedupe::rules::{RuleCatalog, VersionPolicy};
use track_dedupe::scanner::{scan_library, ScanOptions};

const MAX_EXAMPLES: usize = 30;

#[derive(Parser)]
#[command(name = "simulate")]
#[command(about = "Show how an alternative rule catalog changes keys and duplicate groups")]
struct Args {
    library: PathBuf,

    /// Alternative catalog (defaults to the built-in catalog)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Version policy for the alternative catalog (defaults to strip when no
    /// catalog file is given, so the run compares something)
    #[arg(long, value_enum)]
    policy: Option<VersionPolicy>,

    #[arg(long)]
    recursive: bool,

    #[arg(long)]
    log_only: bool,
}

fn alternative_catalog(args: &Args) -> Result<RuleCatalog> {
    let catalog = match &args.rules {
        Some(path) => RuleCatalog::load(path)?,
        None => RuleCatalog::builtin().with_policy(VersionPolicy::Strip),
    };
    Ok(match args.policy {
        Some(policy) => catalog.with_policy(policy),
        None => catalog,
    })
}

fn group_counts(index: &LibraryIndex) -> (usize, usize) {
    let groups = index.duplicate_groups();
    (groups.len(), groups.iter().map(|g| g.files.len()).sum())
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let baseline = Normalizer::default();
    let alternative = Normalizer::new(&alternative_catalog(&args)?)
        .context("Failed to compile alternative catalog")?;

    eprintln!("Scanning {}...", args.library.display());
    let mut stats = ScanStats::default();
    let entries: Vec<LibraryEntry> =
        scan_library(&args.library, ScanOptions { recursive: args.recursive }, &mut stats)?;

    let mut total = 0u64;
    let mut artist_changed = 0u64;
    let mut title_changed = 0u64;
    let mut examples = Vec::new();

    for entry in &entries {
        if entry.tag.missing_fields().any() {
            continue;
        }
        total += 1;

        let old = baseline.normalize_tag(&entry.tag);
        let new = alternative.normalize_tag(&entry.tag);
        if old.artist != new.artist {
            artist_changed += 1;
        }
        if old.title != new.title {
            title_changed += 1;
        }
        if old != new && examples.len() < MAX_EXAMPLES {
            let raw = format!(
                "{} - {}",
                entry.tag.artist.as_deref().unwrap_or_default(),
                entry.tag.title.as_deref().unwrap_or_default()
            );
            examples.push((raw, old, new));
        }
    }

    let old_index = LibraryIndex::build(baseline, entries.iter().cloned());
    let new_index = LibraryIndex::build(alternative, entries.iter().cloned());
    let (old_groups, old_files) = group_counts(&old_index);
    let (new_groups, new_files) = group_counts(&new_index);

    let pct = |n: u64| if total > 0 { 100.0 * n as f64 / total as f64 } else { 0.0 };

    println!("\n=== SIMULATION RESULTS ===\n");
    println!("Tagged files:            {}", total);
    println!("Artist key changed:      {} ({:.2}%)", artist_changed, pct(artist_changed));
    println!("Title key changed:       {} ({:.2}%)", title_changed, pct(title_changed));

    println!("\n=== DUPLICATE GROUPS ===\n");
    println!("Built-in:     {:>7} groups {:>7} files", old_groups, old_files);
    println!("Alternative:  {:>7} groups {:>7} files", new_groups, new_files);

    println!("\n=== EXAMPLES ===\n");
    for (raw, old, new) in &examples {
        println!("\"{}\"", raw);
        println!("  OLD: \"{}\"", old);
        println!("  NEW: \"{}\"", new);
        println!();
    }

    Ok(())
}
