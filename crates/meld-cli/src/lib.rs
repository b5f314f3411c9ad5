//! # meld-cli — Command-Line Tool for Meld Nodes
//!
//! ## Subcommands
//!
//! - `meld derive` — Print the PIN-dependent public key and DID of a chip.
//! - `meld enroll` — Derive, self-sign and register a chip's identity record.
//! - `meld challenge` — Print a fresh challenge, or fetch one from a service.
//! - `meld prove` — Sign a challenge with a chip's PIN-dependent key.
//! - `meld verify` — Submit a signed challenge to a service.
//! - `meld authenticate` — Run challenge-response authentication end to end.
//! - `meld cache` — Inspect, compact, export and import the offline key cache.
//! - `meld serve` — Run the HTTP service with a discovery node.
//!
//! ```bash
//! meld derive --chip-uid 04:A2:3B:1C:9D:4E:80 --pin 1234
//! meld enroll --chip-uid 04:A2:3B:1C:9D:4E:80 --pin 1234 --device-id door-reader-1
//! meld authenticate --chip-uid 04:A2:3B:1C:9D:4E:80 --pin 1234 --cache-dir ~/.meld/cache
//! meld authenticate --chip-uid 04:A2:3B:1C:9D:4E:80 --pin 1234 --remote --registry-url http://door-node:8080
//! ```

pub mod auth;
pub mod cache;
pub mod identity;
pub mod remote;
pub mod serve;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use meld_cache::{CacheConfig, FileStore, OfflineKeyCache};
use tracing_subscriber::EnvFilter;

/// Storage key of the persisted offline cache snapshot.
pub const CACHE_KEY: &str = "offline-keys";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise verbosity picks the level.
pub fn init_tracing(format: LogFormat, verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Open the cache directory and restore its snapshot into a fresh cache.
pub fn open_cache(dir: &Path) -> Result<(FileStore, OfflineKeyCache)> {
    let store = FileStore::open(dir)
        .with_context(|| format!("failed to open cache directory: {}", dir.display()))?;
    let mut cache = OfflineKeyCache::new(CacheConfig::default());
    let restored = cache
        .restore(&store, CACHE_KEY)
        .with_context(|| format!("failed to restore cache snapshot from {}", dir.display()))?;
    tracing::debug!(restored, dir = %dir.display(), "offline cache restored");
    Ok((store, cache))
}
