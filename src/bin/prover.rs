use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use zkp_uniqueness::{
    circuit::Halo2Oracle,
    config::Config,
    ethereum::parse_signal,
    group::{read_commitments, GroupStore, MembershipWitnessProvider},
    identity::Identity,
    oracle::ProofOracle,
    types::ProofEnvelope,
    utils::field_to_hex,
    witness::assemble,
};

const MAX_COMMITMENTS_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Identity secrets written by `generate_identity`.
    #[arg(short, long)]
    identity_file: PathBuf,

    /// Group members, one commitment hex per line, in insertion order.
    #[arg(short, long)]
    commitments_file: PathBuf,

    /// Signal to bind: an Ethereum address or arbitrary text.
    #[arg(short, long)]
    signal: String,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overrides `[context] app_id`. Must be UTF-8.
    #[arg(long)]
    app_id: Option<OsString>,

    /// Overrides `[context] action`. Must be UTF-8.
    #[arg(long)]
    action: Option<OsString>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args
        .config
        .as_ref()
        .map(Config::load_from_file)
        .transpose()?
        .unwrap_or_default();
    let depth = config.group.depth;
    let group_id = config.group.id;

    let identity: Identity = serde_json::from_str(
        &fs::read_to_string(&args.identity_file).context("Failed to read identity file")?,
    )
    .context("Failed to parse identity JSON")?;

    println!("Loading commitments from: {}", args.commitments_file.display());
    let commitments = read_commitments(&args.commitments_file, MAX_COMMITMENTS_FILE_SIZE)?;
    if commitments.is_empty() {
        return Err(anyhow::anyhow!(
            "No commitments found in '{}'",
            args.commitments_file.display()
        ));
    }

    let groups = GroupStore::with_members(group_id, depth, config.zero_value()?, &commitments)?;
    let root = groups.root(group_id)?;
    println!("Loaded {} members, root {}", commitments.len(), field_to_hex(root));

    let membership = groups
        .prove(group_id, identity.commitment())
        .with_context(|| {
            format!(
                "Identity commitment {} is not in '{}'",
                field_to_hex(identity.commitment()),
                args.commitments_file.display()
            )
        })?;

    let context = config.verification_context_with(
        args.app_id.as_deref().map(OsStr::as_encoded_bytes),
        args.action.as_deref().map(OsStr::as_encoded_bytes),
    )?;
    let signal = parse_signal(&args.signal)?;
    let external_nullifier = context.external_nullifier()?;
    debug!("External nullifier: {}", field_to_hex(external_nullifier));

    let witness = assemble(&identity, &membership, depth, external_nullifier, &signal)?;

    println!("Setting up Halo2 keys (k={})...", config.circuit_k());
    let oracle = Halo2Oracle::with_k(config.circuit_k(), depth)?;

    println!("Generating ZK proof (this may take a while)...");
    let (nullifier_hash, proof) = oracle.prove(&witness)?;
    info!("Proof generated, size: {} bytes", proof.len());

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock unavailable")?
        .as_secs();
    let envelope = ProofEnvelope::new(
        context.app_id(),
        context.action(),
        group_id,
        depth,
        root,
        nullifier_hash,
        &signal,
        proof,
        timestamp,
    );

    let output = args.output.unwrap_or(config.proof.output_file.clone());
    let json =
        serde_json::to_string_pretty(&envelope).context("Failed to serialize proof to JSON")?;
    fs::write(&output, json).context("Failed to write proof file")?;

    println!("Proof written to: {}", output.display());
    println!("Context: {context}");
    println!("Nullifier hash: {}", envelope.nullifier_hash);

    Ok(())
}
