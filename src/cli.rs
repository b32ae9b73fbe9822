use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use secrecy::SecretString;
use tracing::info;

use crate::certdb::{RevocationReason, SharedAccessor, new_accessor};
use crate::config::DbConfig;
use crate::crl::{CrlRequest, generate_crl};

#[derive(Debug, Parser)]
#[command(name = "certdb")]
#[command(version)]
#[command(about = "Certificate revocation store and CRL generator")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a signed CRL and print it as base64 DER
    Crl(CrlArgs),
    /// Mark a certificate as revoked
    Revoke(RevokeArgs),
}

#[derive(Debug, Args)]
pub struct CrlArgs {
    /// Database configuration file (JSON, TOML or YAML)
    #[arg(long)]
    pub db_config: PathBuf,

    /// CA certificate (PEM)
    #[arg(long)]
    pub ca: Option<PathBuf>,

    /// CA private key (PEM)
    #[arg(long)]
    pub ca_key: Option<PathBuf>,

    /// Passphrase for an encrypted CA key
    #[arg(long, env = "CERTDB_CA_PK_PASSWORD", hide_env_values = true)]
    pub ca_key_password: Option<String>,

    /// How long the CRL stays valid, e.g. 30m, 12h, 7d
    #[arg(long, default_value = "168h", value_parser = parse_duration)]
    pub expiry: Duration,

    /// Only list certificates issued under this CA label
    #[arg(long)]
    pub label: Option<String>,
}

impl CrlArgs {
    pub fn request(&self) -> CrlRequest {
        let mut request = CrlRequest::new(
            self.ca.clone().unwrap_or_default(),
            self.ca_key.clone().unwrap_or_default(),
        )
        .with_expiry(self.expiry);
        if let Some(password) = &self.ca_key_password {
            request = request.with_passphrase(SecretString::from(password.clone()));
        }
        if let Some(label) = &self.label {
            request = request.with_label(label.clone());
        }
        request
    }
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    /// Database configuration file (JSON, TOML or YAML)
    #[arg(long)]
    pub db_config: PathBuf,

    /// Serial number of the certificate (decimal)
    #[arg(long)]
    pub serial: String,

    /// Authority key identifier of the issuing CA
    #[arg(long)]
    pub aki: String,

    /// Reason name (e.g. keyCompromise) or RFC 5280 code
    #[arg(long, default_value = "unspecified")]
    pub reason: RevocationReason,
}

/// Parses `<n>{s,m,h,d}`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {value:?} (use s, m, h or d)"))?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("invalid duration {value:?}"))?;
    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        other => return Err(format!("unknown duration unit {other:?} (use s, m, h or d)")),
    };
    duration.ok_or_else(|| format!("duration {value:?} is out of range"))
}

pub async fn handle_command(cli: Cli) -> color_eyre::Result<()> {
    match cli.command {
        Commands::Crl(args) => {
            let request = args.request();
            // Reject missing CA material before touching the database.
            request.validate()?;
            let accessor = open_store(&args.db_config).await?;
            let der = generate_crl(accessor.as_ref(), &request).await?;
            println!("{}", BASE64_STANDARD.encode(der));
            Ok(())
        }
        Commands::Revoke(args) => {
            let accessor = open_store(&args.db_config).await?;
            accessor
                .revoke_certificate(&args.serial, &args.aki, args.reason.code())
                .await?;
            info!(serial = %args.serial, aki = %args.aki, reason = args.reason.code(), "revoked certificate");
            Ok(())
        }
    }
}

async fn open_store(path: &Path) -> color_eyre::Result<SharedAccessor> {
    let config = DbConfig::load_file(path)
        .wrap_err_with(|| format!("failed to load database configuration {}", path.display()))?;
    Ok(new_accessor(&config).await?)
}
