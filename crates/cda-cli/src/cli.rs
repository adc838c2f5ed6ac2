use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cda",
    about = "Certified data availability: chunked uploads committed to a certified ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the JSON-RPC and REST server
    Serve(ServeArgs),
    /// Verify a record served by `/get-by-hash` offline
    Verify(VerifyArgs),
    /// Print the payload digest of a file
    Hash(HashArgs),
    /// Generate a ledger signing seed and print its public key
    Keygen(KeygenArgs),
    /// Print the default server configuration as TOML
    Config,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Override the owner principal
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// JSON record with base64 `certificate`, `witness`, and `data` fields
    #[arg(long)]
    pub record: PathBuf,
    /// Hex-encoded root public key
    #[arg(long)]
    pub root_key: String,
    /// Expected payload digest. Computed from the record's data when absent.
    #[arg(long)]
    pub digest: Option<String>,
    /// Owner principal. Taken from the record's `canister` field when absent.
    #[arg(long)]
    pub owner: Option<String>,
    /// Reject certificates older than this many seconds
    #[arg(long)]
    pub max_age_secs: Option<u64>,
}

#[derive(Args)]
pub struct HashArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Derive from an existing hex seed instead of generating one
    #[arg(long)]
    pub seed: Option<String>,
}
