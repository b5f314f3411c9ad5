//! # meld CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use meld_cli::auth::{
    run_authenticate, run_challenge, run_prove, run_verify, AuthenticateArgs, ChallengeArgs,
    ProveArgs, VerifyArgs,
};
use meld_cli::cache::{run_cache, CacheArgs};
use meld_cli::identity::{run_derive, run_enroll, DeriveArgs, EnrollArgs};
use meld_cli::serve::{run_serve, ServeArgs};
use meld_cli::{init_tracing, LogFormat};

/// Chip-bound identity for NFC-authenticated devices.
///
/// Derives PIN-dependent Ed25519 keys from chip UIDs, registers them with a
/// peer-to-peer or centralized registry, and authenticates chip bearers by
/// challenge-response.
#[derive(Parser, Debug)]
#[command(name = "meld", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "MELD_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a chip's PIN-dependent public key and DID.
    Derive(DeriveArgs),

    /// Derive, sign and register a chip's identity record.
    Enroll(EnrollArgs),

    /// Print a fresh challenge, or request one from a service.
    Challenge(ChallengeArgs),

    /// Sign a challenge with a chip's PIN-dependent key.
    Prove(ProveArgs),

    /// Submit a signed challenge to a service for verification.
    Verify(VerifyArgs),

    /// Authenticate a chip bearer end to end.
    Authenticate(AuthenticateArgs),

    /// Offline key cache maintenance (list, prune, export, import).
    Cache(CacheArgs),

    /// Run the HTTP service with a discovery node.
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);
    tracing::debug!("meld CLI starting");

    let result = match cli.command {
        Commands::Derive(args) => run_derive(args),
        Commands::Enroll(args) => run_enroll(args).await,
        Commands::Challenge(args) => run_challenge(args).await,
        Commands::Prove(args) => run_prove(args),
        Commands::Verify(args) => run_verify(args).await,
        Commands::Authenticate(args) => run_authenticate(args).await,
        Commands::Cache(args) => run_cache(&args),
        Commands::Serve(args) => run_serve(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
