use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
///
/// Object store credentials are not part of it: they live in the host's
/// settings record and are re-read on every operation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub site_path: String,
}

/// What the process should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Offload every local attachment once and exit.
    MigrateFiles,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Offloads host file attachments to S3-compatible object storage")]
pub struct Args {
    /// Host to bind to (overrides OFFLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OFFLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Host database URL (overrides OFFLOAD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Host site directory holding `public/` and private files (overrides OFFLOAD_SITE_PATH)
    #[arg(long)]
    pub site_path: Option<String>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "migrate_files")]
    pub migrate: bool,

    /// Offload all existing local attachments and exit
    #[arg(long)]
    pub migrate_files: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("OFFLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("OFFLOAD_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing OFFLOAD_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading OFFLOAD_PORT"),
        };
        let env_db = env::var("OFFLOAD_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/offload.db".into());
        let env_site = env::var("OFFLOAD_SITE_PATH").unwrap_or_else(|_| "./site".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            site_path: args.site_path.unwrap_or(env_site),
        };

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.migrate_files {
            RunMode::MigrateFiles
        } else {
            RunMode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
