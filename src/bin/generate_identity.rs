use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::OsRng;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use zkp_uniqueness::{hasher::require_utf8, identity::Identity, utils::field_to_hex};

/// Creates an identity and registers its commitment in a commitments file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Derive the identity from this secret message instead of sampling it.
    /// Must be UTF-8.
    #[arg(short, long)]
    message: Option<OsString>,

    /// Where to write the identity secrets (JSON).
    #[arg(short, long, default_value = "identity.json")]
    output: PathBuf,

    /// Commitments file the new commitment is appended to.
    #[arg(short, long, default_value = "commitments.txt")]
    commitments_file: PathBuf,

    /// Also append this many random commitments of other members.
    #[arg(long, default_value_t = 0)]
    decoys: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let identity = match &args.message {
        Some(message) => {
            let message = require_utf8(message.as_encoded_bytes(), "message")?;
            Identity::from_message(message).context("Failed to derive identity")?
        }
        None => Identity::random(OsRng),
    };

    let json =
        serde_json::to_string_pretty(&identity).context("Failed to serialize identity to JSON")?;
    fs::write(&args.output, json)
        .with_context(|| format!("Failed to write identity to {}", args.output.display()))?;
    info!("Identity written to {}", args.output.display());

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.commitments_file)
        .with_context(|| {
            format!(
                "Failed to open commitments file {}",
                args.commitments_file.display()
            )
        })?;

    for _ in 0..args.decoys {
        writeln!(file, "{}", field_to_hex(Identity::random(OsRng).commitment()))
            .context("Failed to write decoy commitment")?;
    }
    writeln!(file, "{}", field_to_hex(identity.commitment()))
        .context("Failed to write commitment")?;

    println!("Identity commitment: {}", field_to_hex(identity.commitment()));
    println!(
        "Appended {} commitment(s) to {}",
        args.decoys + 1,
        args.commitments_file.display()
    );

    Ok(())
}
