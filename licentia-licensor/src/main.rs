//! Licentia licensor
//!
//! Offline tool for the license issuer:
//! 1. Generate an Ed25519 key pair
//! 2. Sign license documents with the private key
//! 3. Verify a document against the public key
//!
//! Usage:
//!   licentia-licensor keygen --out-dir keys/
//!   licentia-licensor sign --feature shield --issued-to acme \
//!       --private-key keys/licentia.key --public-key keys/licentia.pub
//!   licentia-licensor verify --license shield.json --public-key keys/licentia.pub

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use licentia_licensor::{parse_expiry_date, SignRequest, Validity};
use licentia_license::{DEFAULT_LICENSE_TYPE, DEFAULT_SUBSCRIPTION_TYPE};
use licentia_types::Timestamp;
use std::{fs, path::PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "licentia-licensor")]
#[command(about = "Licentia offline license signing tool")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new signing key pair
    Keygen {
        /// Directory to write licentia.key and licentia.pub into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Sign a new license
    Sign {
        /// Feature granted by the license
        #[arg(long)]
        feature: String,

        /// Licensee
        #[arg(long)]
        issued_to: String,

        /// Issuing party
        #[arg(long, default_value = "licentia")]
        issuer: String,

        /// License type
        #[arg(long = "type", default_value = DEFAULT_LICENSE_TYPE)]
        license_type: String,

        /// Subscription type
        #[arg(long, default_value = DEFAULT_SUBSCRIPTION_TYPE)]
        subscription_type: String,

        /// Validity in days from now
        #[arg(long, default_value = "365", conflicts_with = "expiry_date")]
        valid_for_days: u32,

        /// Explicit expiry (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        expiry_date: Option<String>,

        /// Maximum number of cluster nodes
        #[arg(long, default_value = "1")]
        max_nodes: u32,

        /// Private key file
        #[arg(long)]
        private_key: PathBuf,

        /// Public key file paired with the private key
        #[arg(long)]
        public_key: PathBuf,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a license document
    Verify {
        /// License document to verify
        #[arg(long)]
        license: PathBuf,

        /// Public key file
        #[arg(long)]
        public_key: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Keygen { out_dir } => {
            let paths = licentia_licensor::keygen(&out_dir)?;
            info!("Private key: {}", paths.private_key.display());
            info!("Public key:  {}", paths.public_key.display());
        }
        Command::Sign {
            feature,
            issued_to,
            issuer,
            license_type,
            subscription_type,
            valid_for_days,
            expiry_date,
            max_nodes,
            private_key,
            public_key,
            output,
        } => {
            let validity = match expiry_date {
                Some(date) => Validity::Until(parse_expiry_date(&date)?),
                None => Validity::Days(valid_for_days),
            };
            let request = SignRequest {
                feature,
                issued_to,
                issuer,
                license_type,
                subscription_type,
                validity,
                max_nodes,
                private_key,
                public_key,
            };
            let document = licentia_licensor::sign(&request, Timestamp::now())?;
            match output {
                Some(path) => {
                    fs::write(&path, &document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("License written to {}", path.display());
                }
                None => println!("{document}"),
            }
        }
        Command::Verify {
            license,
            public_key,
        } => {
            let document = fs::read_to_string(&license)
                .with_context(|| format!("Failed to read {}", license.display()))?;
            let report = licentia_licensor::verify(&document, &public_key, Timestamp::now())?;
            println!("{report}");
        }
    }
    Ok(())
}
