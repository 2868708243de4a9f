use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use zkp_uniqueness::{
    circuit::Halo2Oracle,
    config::Config,
    gateway::VerificationGateway,
    group::{read_commitments, GroupStore, TimeoutProvider},
    oracle::TimeoutOracle,
    store::FileNullifierStore,
    types::{ProofEnvelope, VerificationReport},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    proof_file: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Current group members, one commitment hex per line, in insertion
    /// order. Proofs must be against the root of this group.
    #[arg(short, long)]
    commitments_file: PathBuf,

    /// Spent-nullifier file. Defaults to `[store] nullifier_file`.
    #[arg(short, long)]
    nullifier_file: Option<PathBuf>,

    /// Overrides `[context] app_id`. Must be UTF-8.
    #[arg(long)]
    app_id: Option<OsString>,

    /// Overrides `[context] action`. Must be UTF-8.
    #[arg(long)]
    action: Option<OsString>,
}

const MAX_COMMITMENTS_FILE_SIZE: u64 = 100 * 1024 * 1024;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args
        .config
        .as_ref()
        .map(Config::load_from_file)
        .transpose()?
        .unwrap_or_default()
        .with_env_overrides();

    info!("Loading proof from: {}", args.proof_file.display());
    let metadata = fs::metadata(&args.proof_file).with_context(|| {
        format!("Proof file does not exist: {}", args.proof_file.display())
    })?;
    debug!("Proof file size: {} bytes", metadata.len());
    if metadata.len() > config.proof.max_file_size {
        return Err(anyhow::anyhow!(
            "Proof file too large: {} bytes (max {} bytes). Set ZKP_MAX_PROOF_FILE_SIZE to override.",
            metadata.len(),
            config.proof.max_file_size
        ));
    }

    let content = fs::read_to_string(&args.proof_file).context("Failed to read proof file")?;
    let envelope: ProofEnvelope =
        serde_json::from_str(&content).context("Failed to parse proof JSON")?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock unavailable")?
        .as_secs();
    let decoded = envelope
        .validate(&config.envelope_limits(), now)
        .context("Proof validation failed")?;

    let context = config.verification_context_with(
        args.app_id.as_deref().map(OsStr::as_encoded_bytes),
        args.action.as_deref().map(OsStr::as_encoded_bytes),
    )?;
    if envelope.app_id != context.app_id() || envelope.action != context.action() {
        warn!(
            "Proof claims context {}/{}, verifying under configured {context}",
            envelope.app_id, envelope.action
        );
    }
    if envelope.depth != config.group.depth {
        return Err(anyhow::anyhow!(
            "Proof depth {} does not match configured depth {}",
            envelope.depth,
            config.group.depth
        ));
    }
    if envelope.group_id != config.group.id {
        warn!(
            "Proof claims group {}, verifying against configured group {}",
            envelope.group_id, config.group.id
        );
    }

    info!("Loading group from: {}", args.commitments_file.display());
    let commitments = read_commitments(&args.commitments_file, MAX_COMMITMENTS_FILE_SIZE)?;
    let groups = GroupStore::with_members(
        config.group.id,
        config.group.depth,
        config.zero_value()?,
        &commitments,
    )?;
    info!("Group {} has {} members", config.group.id, groups.size(config.group.id)?);

    let nullifier_file = args
        .nullifier_file
        .clone()
        .unwrap_or_else(|| config.store.nullifier_file.clone());
    let store = FileNullifierStore::open(&nullifier_file)?;

    println!("Setting up Halo2 keys (k={})...", config.circuit_k());
    let oracle = TimeoutOracle::new(
        Halo2Oracle::with_k(config.circuit_k(), config.group.depth)?,
        config.oracle_timeout(),
    );
    let roots = TimeoutProvider::new(groups, config.oracle_timeout());
    let gateway = VerificationGateway::new(context, config.group.id, roots, oracle, store)?;

    println!("Verifying ZK proof...");
    let outcome = gateway.verify_and_record(
        decoded.root,
        decoded.nullifier_hash,
        &decoded.signal,
        &envelope.proof,
    );
    let report = VerificationReport::from_outcome(decoded.nullifier_hash, &outcome);
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    match outcome {
        Ok(_) => {
            println!("\n✓ Proof verification PASSED!");
            println!("Nullifier recorded to: {}", nullifier_file.display());
            Ok(())
        }
        Err(e) => {
            error!("Proof verification FAILED: {}", e.kind());
            println!("\n✗ Proof verification FAILED!");
            Err(anyhow::anyhow!("Proof rejected: {} ({e})", e.kind()))
        }
    }
}
