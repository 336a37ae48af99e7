use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudvault_core::backup::plan_upload;
use cloudvault_core::client::RelayClient;
use cloudvault_core::pairing::{
    ClaimPairingRequest, DeviceType, RevokeDeviceRequest, StartPairingRequest,
};
use cloudvault_core::sync::{InitVaultRequest, PushVaultRequest};
use cloudvault_core::{decrypt_payload, encrypt_payload, EncryptedEnvelope, KdfChoice};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroizing;

/// CloudVault CLI - encrypted envelopes, cloud sync and snapshot backups
#[derive(Parser)]
#[command(name = "cloudvault")]
#[command(about = "Encrypted cloud sync and backup for a local vault", long_about = None)]
struct Cli {
    /// Relay base URL
    #[arg(long, global = true, env = "CLOUDVAULT_RELAY", default_value = "http://127.0.0.1:8743")]
    relay: String,

    /// Bearer session token for the relay
    #[arg(long, global = true, env = "CLOUDVAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KdfArg {
    Pbkdf2,
    Scrypt,
}

impl From<KdfArg> for KdfChoice {
    fn from(arg: KdfArg) -> Self {
        match arg {
            KdfArg::Pbkdf2 => KdfChoice::default(),
            KdfArg::Scrypt => KdfChoice::scrypt_default(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a JSON file into an envelope
    Seal {
        /// Plaintext JSON payload
        #[arg(long)]
        input: PathBuf,

        /// Where to write the envelope
        #[arg(long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "pbkdf2")]
        kdf: KdfArg,
    },

    /// Decrypt an envelope and print its payload
    Open {
        /// Envelope file
        #[arg(long)]
        input: PathBuf,
    },

    /// Show how a snapshot would be split into parts
    Plan {
        /// Snapshot size in bytes
        #[arg(long)]
        size: u64,

        /// Requested part size in bytes
        #[arg(long)]
        part_size: Option<u64>,
    },

    /// Create the cloud vault from an envelope file
    Init {
        #[arg(long)]
        name: String,

        #[arg(long)]
        envelope: PathBuf,
    },

    /// Replace the cloud vault if it is still at the given version
    Push {
        #[arg(long)]
        envelope: PathBuf,

        /// Version the envelope was based on (0 creates the vault)
        #[arg(long)]
        if_match: u64,
    },

    /// Download the current cloud vault envelope
    Pull {
        #[arg(long)]
        output: PathBuf,
    },

    /// Upload a large encrypted snapshot through the multipart pipeline
    Backup {
        #[arg(long)]
        snapshot_id: String,

        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        part_size: Option<u64>,
    },

    /// Device pairing
    #[command(subcommand)]
    Pair(PairCommands),

    /// List paired devices
    Devices,

    /// Revoke a paired device
    Revoke {
        device_id: Uuid,
    },
}

#[derive(Subcommand)]
enum PairCommands {
    /// Start pairing and print the code
    Start {
        #[arg(long)]
        name: String,

        #[arg(long, value_parser = parse_device_type, default_value = "agent")]
        device_type: DeviceType,
    },

    /// Claim a code on the new device
    Claim { code: String },

    /// Show the status of a code
    Status { code: String },
}

fn parse_device_type(s: &str) -> std::result::Result<DeviceType, String> {
    DeviceType::parse(&s.to_ascii_lowercase())
        .ok_or_else(|| "device type must be agent, vault or mobile".to_string())
}

fn prompt_passphrase(confirm: bool) -> Result<Zeroizing<String>> {
    let passphrase = Zeroizing::new(rpassword::prompt_password("Passphrase: ")?);
    if passphrase.is_empty() {
        bail!("Passphrase must not be empty");
    }
    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Confirm passphrase: ")?);
        if *again != *passphrase {
            bail!("Passphrases do not match");
        }
    }
    Ok(passphrase)
}

fn read_envelope(path: &Path) -> Result<EncryptedEnvelope> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("File is not an envelope")
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn relay_client(cli: &Cli) -> Result<RelayClient> {
    let token = cli
        .token
        .as_deref()
        .context("A relay token is required (--token or CLOUDVAULT_TOKEN)")?;
    Ok(RelayClient::new(&cli.relay, token)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Seal { input, output, kdf } => {
            let content = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let payload: Value = serde_json::from_str(&content).context("Input is not JSON")?;
            let passphrase = prompt_passphrase(true)?;
            let envelope = encrypt_payload(&payload, passphrase.as_bytes(), &KdfChoice::from(*kdf))?;
            write_json(output, &envelope)?;
            info!("Sealed {} into {}", input.display(), output.display());
        }
        Commands::Open { input } => {
            let envelope = read_envelope(input)?;
            let passphrase = prompt_passphrase(false)?;
            let payload: Value = decrypt_payload(&envelope, passphrase.as_bytes())?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Plan { size, part_size } => {
            let plan = plan_upload(*size, *part_size)?;
            println!(
                "{} bytes -> {} parts of {} bytes",
                plan.size_bytes, plan.part_count, plan.part_size_bytes
            );
        }
        Commands::Init { name, envelope } => {
            let client = relay_client(&cli)?;
            let response = client
                .sync_init(&InitVaultRequest {
                    vault_name: name.clone(),
                    envelope: read_envelope(envelope)?,
                })
                .await?;
            println!("Cloud vault at version {}", response.version);
        }
        Commands::Push { envelope, if_match } => {
            let client = relay_client(&cli)?;
            let response = client
                .sync_push(&PushVaultRequest {
                    envelope: read_envelope(envelope)?,
                    if_match_version: *if_match,
                    version: if_match + 1,
                })
                .await?;
            println!("Pushed version {}", response.version);
        }
        Commands::Pull { output } => {
            let client = relay_client(&cli)?;
            let response = client.sync_pull().await?;
            write_json(output, &response.envelope)?;
            println!(
                "Pulled version {} (updated {})",
                response.version, response.updated_at
            );
        }
        Commands::Backup {
            snapshot_id,
            file,
            part_size,
        } => {
            let client = relay_client(&cli)?;
            let completed = client.upload_snapshot(snapshot_id, file, *part_size).await?;
            println!("Uploaded {} (etag {})", completed.location, completed.etag);
        }
        Commands::Pair(PairCommands::Start { name, device_type }) => {
            let client = relay_client(&cli)?;
            let started = client
                .pairing_start(&StartPairingRequest {
                    device_name: name.clone(),
                    device_type: *device_type,
                })
                .await?;
            println!("Pairing code: {} (expires {})", started.code, started.expires_at);
        }
        Commands::Pair(PairCommands::Claim { code }) => {
            let client = relay_client(&cli)?;
            let claimed = client
                .pairing_claim(&ClaimPairingRequest { code: code.clone() })
                .await?;
            println!("Device id: {}", claimed.device_id);
            println!("Device token (shown once): {}", claimed.device_token);
        }
        Commands::Pair(PairCommands::Status { code }) => {
            let client = relay_client(&cli)?;
            let status = client.pairing_status(code).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Devices => {
            let client = relay_client(&cli)?;
            for device in client.list_devices().await? {
                println!(
                    "{}  {:<24} {:<7} {}",
                    device.device_id,
                    device.device_name,
                    device.device_type.as_str(),
                    device.status
                );
            }
        }
        Commands::Revoke { device_id } => {
            let client = relay_client(&cli)?;
            client
                .pairing_revoke(&RevokeDeviceRequest {
                    device_id: *device_id,
                })
                .await?;
            println!("Revoked {}", device_id);
        }
    }

    Ok(())
}
