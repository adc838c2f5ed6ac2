use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use colored::Colorize;
use serde::Deserialize;

use cda_certificate::{CertificateVerifier, VerifiedRecord};
use cda_crypto::{dastree, SigningKey};
use cda_server::{DaServer, ServerConfig};
use cda_types::{CertifiedRecord, Digest, OwnerId};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Verify(args) => cmd_verify(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Keygen(args) => cmd_keygen(args),
        Command::Config => cmd_config(),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(owner) = args.owner {
        config.owner = owner;
    }

    let server = DaServer::new(config)?;
    println!("{} cda server on {}", "✓".green().bold(), server.config().bind_addr.to_string().bold());
    println!("  Owner:    {}", server.config().owner.cyan());
    println!("  Root key: {}", hex::encode(server.root_public_key()).yellow());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    match verify_record(&args) {
        Ok((digest, verified)) => {
            println!("{} Record verified", "✓".green().bold());
            println!("  Digest:    {}", digest.to_prefixed_hex().yellow());
            println!("  Root:      {}", verified.committed_root.to_prefixed_hex());
            println!("  Delegated: {}", verified.delegated);
            if let Some(nanos) = verified.certified_at_nanos {
                println!("  Certified: {nanos} ns since epoch");
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Verification failed: {e:#}", "✗".red().bold());
            Err(e)
        }
    }
}

fn cmd_hash(args: HashArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let digest = dastree::hash(&bytes);
    println!("{}  {}", digest.to_prefixed_hex(), args.path.display());
    Ok(())
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let key = match args.seed {
        Some(seed) => signing_key_from_hex(&seed)?,
        None => SigningKey::generate(),
    };
    println!("signing_seed = \"{}\"", hex::encode(key.as_bytes()));
    println!("# public key: {}", hex::encode(key.verifying_key().as_bytes()));
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(&ServerConfig::default())?);
    Ok(())
}

/// A record as served by `GET /get-by-hash/{digest}`.
#[derive(Debug, Deserialize)]
struct RecordFile {
    certificate: String,
    witness: String,
    data: String,
    #[serde(default)]
    canister: Option<String>,
}

fn load_record(path: &Path, owner: Option<&str>) -> anyhow::Result<CertifiedRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: RecordFile = serde_json::from_str(&text).context("parsing record JSON")?;
    let owner = match owner.or(file.canister.as_deref()) {
        Some(text) => OwnerId::from_text(text).context("owner")?,
        None => bail!("record has no canister; pass --owner"),
    };
    Ok(CertifiedRecord {
        certificate: decode_field(&file.certificate).context("certificate")?,
        witness: decode_field(&file.witness).context("witness")?,
        data: decode_field(&file.data).context("data")?,
        owner,
    })
}

/// `0x`-prefixed fields are hex, anything else is standard base64.
fn decode_field(field: &str) -> anyhow::Result<Vec<u8>> {
    match field.strip_prefix("0x") {
        Some(digits) => Ok(hex::decode(digits)?),
        None => Ok(STANDARD.decode(field)?),
    }
}

fn verify_record(args: &VerifyArgs) -> anyhow::Result<(Digest, VerifiedRecord)> {
    let record = load_record(&args.record, args.owner.as_deref())?;
    let root_key = hex::decode(args.root_key.trim_start_matches("0x")).context("root key")?;

    let computed = dastree::hash(&record.data);
    let digest = match &args.digest {
        Some(hex) => {
            let expected = Digest::from_hex(hex).context("digest")?;
            if expected != computed {
                bail!("data hashes to {computed}, expected {expected}");
            }
            expected
        }
        None => computed,
    };

    let mut verifier = CertificateVerifier::default();
    let verified = match args.max_age_secs {
        Some(secs) => {
            verifier = verifier.with_max_age(std::time::Duration::from_secs(secs));
            verifier.verify_at(&record, &root_key, &record.owner, &digest, now_nanos())?
        }
        None => verifier.verify(&record, &root_key, &record.owner, &digest)?,
    };
    Ok((digest, verified))
}

fn signing_key_from_hex(seed: &str) -> anyhow::Result<SigningKey> {
    let bytes = hex::decode(seed.trim_start_matches("0x")).context("seed")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("seed must be 32 bytes, got {}", b.len()))?;
    Ok(SigningKey::from_bytes(seed))
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
