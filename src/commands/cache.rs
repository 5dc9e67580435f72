//! # Cache Command Implementation
//!
//! Inspects and purges the mirror caches outside of a deployment run.
//!
//! ## Subcommands
//!
//! - **`list`**: every mirror under the module and environment caches, with
//!   its size
//! - **`clean`**: delete mirrors, either all of them or the one for `--url`.
//!   Deleting a corrupt mirror forces a fresh clone on the next sync.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use mirrorsync::defaults;
use mirrorsync::git;
use mirrorsync::output::{emoji, status_line, Status};

use crate::cli::GlobalOptions;

/// Manage cached git mirrors
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Directory holding module mirrors
    #[arg(long, value_name = "DIR", env = "MIRRORSYNC_CACHE", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory holding environment mirrors
    #[arg(long, value_name = "DIR", global = true)]
    pub env_cache_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List cached mirrors
    List(ListArgs),
    /// Delete cached mirrors
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Only delete the mirror of this repository URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Show what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// One mirror directory found in a cache.
#[derive(Debug, Clone, Serialize)]
struct MirrorEntry {
    kind: &'static str,
    name: String,
    path: PathBuf,
    size: u64,
}

/// Execute the `cache` command.
pub fn execute(args: CacheArgs, globals: &GlobalOptions) -> Result<()> {
    let caches = [
        (
            "module",
            args.cache_dir
                .clone()
                .unwrap_or_else(defaults::default_mirror_cache_dir),
        ),
        (
            "environment",
            args.env_cache_dir
                .clone()
                .unwrap_or_else(defaults::default_env_cache_dir),
        ),
    ];
    match args.command {
        CacheSubcommand::List(list_args) => execute_list(&caches, list_args),
        CacheSubcommand::Clean(clean_args) => execute_clean(&caches, clean_args, globals),
    }
}

fn execute_list(caches: &[(&'static str, PathBuf)], args: ListArgs) -> Result<()> {
    let entries = scan_caches(caches)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        for (kind, dir) in caches {
            println!("No {} mirrors in {}", kind, dir.display());
        }
        return Ok(());
    }

    println!("{:<12} {:<56} {:>12}", "KIND", "MIRROR", "SIZE");
    println!("{}", "-".repeat(82));
    for entry in &entries {
        println!(
            "{:<12} {:<56} {:>12}",
            entry.kind,
            entry.name,
            format_size(entry.size)
        );
    }
    println!("\nTotal: {} mirrors", entries.len());
    Ok(())
}

fn execute_clean(
    caches: &[(&'static str, PathBuf)],
    args: CleanArgs,
    globals: &GlobalOptions,
) -> Result<()> {
    let mut entries = scan_caches(caches)?;
    if let Some(url) = &args.url {
        let name = git::mirror_dir_name(url);
        entries.retain(|entry| entry.name == name);
        if entries.is_empty() {
            bail!("No cached mirror for {}", url);
        }
    }
    if entries.is_empty() {
        println!("No cached mirrors to clean.");
        return Ok(());
    }

    println!("Mirrors to be deleted:\n");
    for entry in &entries {
        println!("  {} ({})", entry.path.display(), format_size(entry.size));
    }

    if args.dry_run {
        println!(
            "\n{}",
            status_line(&globals.output, Status::DryRun, "Dry run: no mirror was deleted")
        );
        return Ok(());
    }

    if !args.yes {
        print!("\nDelete {} mirrors? (y/N): ", entries.len());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Clean cancelled.");
            return Ok(());
        }
    }

    let mut failed = 0;
    for entry in &entries {
        match fs::remove_dir_all(&entry.path) {
            Ok(()) => log::info!("Deleted mirror {}", entry.path.display()),
            Err(e) => {
                failed += 1;
                eprintln!(
                    "  {} Failed to delete {}: {}",
                    emoji(&globals.output, "❌", "[FAIL]"),
                    entry.path.display(),
                    e
                );
            }
        }
    }
    let deleted = entries.len() - failed;
    if deleted > 0 {
        println!(
            "\n{}",
            status_line(
                &globals.output,
                Status::Ok,
                &format!("Deleted {} mirrors", deleted)
            )
        );
    }
    if failed > 0 {
        bail!("Failed to delete {} mirrors", failed);
    }
    Ok(())
}

/// Every mirror directory directly under each cache root, sorted by name.
fn scan_caches(caches: &[(&'static str, PathBuf)]) -> Result<Vec<MirrorEntry>> {
    let mut entries = Vec::new();
    for (kind, dir) in caches {
        if !dir.is_dir() {
            continue;
        }
        let mut found = Vec::new();
        for item in fs::read_dir(dir)? {
            let path = item?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            found.push(MirrorEntry {
                kind: *kind,
                name: name.to_string(),
                size: directory_size(&path),
                path,
            });
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        entries.extend(found);
    }
    Ok(entries)
}

fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }
    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
