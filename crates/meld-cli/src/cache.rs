//! # Cache Subcommand
//!
//! Maintenance of a persisted offline key cache directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use meld_cache::CompactEntry;

use crate::{open_cache, CACHE_KEY};

/// Arguments for `meld cache`.
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Directory holding the persisted cache.
    #[arg(long, env = "MELD_CACHE_DIR", global = true, default_value = ".meld/cache")]
    pub cache_dir: PathBuf,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached keys, oldest first.
    List,
    /// Remove stale entries and rewrite the snapshot.
    Prune,
    /// Write the compact snapshot to a JSON file.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Merge a compact snapshot from a JSON file.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub fn run_cache(args: &CacheArgs) -> Result<u8> {
    match &args.command {
        CacheCommand::List => cmd_list(&args.cache_dir),
        CacheCommand::Prune => cmd_prune(&args.cache_dir),
        CacheCommand::Export { file } => cmd_export(&args.cache_dir, file),
        CacheCommand::Import { file } => cmd_import(&args.cache_dir, file),
    }
}

fn cmd_list(dir: &Path) -> Result<u8> {
    let (_, cache) = open_cache(dir)?;
    if cache.is_empty() {
        println!("cache is empty");
        return Ok(0);
    }
    for entry in cache.entries() {
        let state = if cache.get(&entry.chip_uid).is_some() {
            "fresh"
        } else {
            "stale"
        };
        println!(
            "{}  {}  {}  {state}",
            entry.chip_uid, entry.did, entry.cached_at
        );
    }
    Ok(0)
}

fn cmd_prune(dir: &Path) -> Result<u8> {
    let (store, mut cache) = open_cache(dir)?;
    let removed = cache.prune();
    let kept = cache
        .persist(&store, CACHE_KEY)
        .context("failed to rewrite cache snapshot")?;
    println!("OK: removed {removed} stale entries, {kept} remain");
    Ok(0)
}

fn cmd_export(dir: &Path, file: &Path) -> Result<u8> {
    let (_, cache) = open_cache(dir)?;
    let snapshot = cache.export();
    std::fs::write(file, serde_json::to_vec_pretty(&snapshot)?)
        .with_context(|| format!("failed to write {}", file.display()))?;
    println!("OK: exported {} entries to {}", snapshot.len(), file.display());
    Ok(0)
}

fn cmd_import(dir: &Path, file: &Path) -> Result<u8> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let snapshot: Vec<CompactEntry> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a cache snapshot", file.display()))?;
    let (store, mut cache) = open_cache(dir)?;
    let applied = cache.import(&snapshot).context("snapshot rejected")?;
    cache.persist(&store, CACHE_KEY).context("failed to rewrite cache snapshot")?;
    println!("OK: imported {applied} of {} entries", snapshot.len());
    Ok(0)
}
