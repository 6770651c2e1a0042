//! Configuration for the filesystem object server binary.
//! Combines environment variables and CLI arguments; CLI wins.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};

/// Runtime configuration of the object server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub base_path: PathBuf,
    pub url_encryption_key: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Presigned-URL object server for the filesystem backend")]
pub struct Args {
    /// Host to bind to (overrides BLOBSIGN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOBSIGN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides BLOBSIGN_BASE_PATH)
    #[arg(long)]
    pub base_path: Option<PathBuf>,

    /// 32-byte token encryption key (overrides BLOBSIGN_URL_ENCRYPTION_KEY)
    #[arg(long)]
    pub url_encryption_key: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        let env_host = env::var("BLOBSIGN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("BLOBSIGN_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing BLOBSIGN_PORT value `{value}`"))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading BLOBSIGN_PORT"),
        };
        let env_base_path = env::var("BLOBSIGN_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| "./data/objects".into());
        let env_key = env::var("BLOBSIGN_URL_ENCRYPTION_KEY").ok();

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            base_path: args.base_path.unwrap_or(env_base_path),
            url_encryption_key: match args.url_encryption_key.or(env_key) {
                Some(key) => key,
                None => bail!("BLOBSIGN_URL_ENCRYPTION_KEY (or --url-encryption-key) is required"),
            },
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
