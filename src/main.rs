use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, RunMode};
use services::{
    object_store::S3Connector, offload_service::OffloadService, records::AttachmentRepo,
    rewriter::SitePaths,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting attachment-offload with config: {:?}", cfg);

    if !Path::new(&cfg.site_path).exists() {
        tracing::warn!(
            "Site directory {} does not exist; local attachments cannot be offloaded",
            cfg.site_path
        );
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Handle migration mode ---
    if mode == RunMode::Migrate {
        let count = AttachmentRepo::new(db.clone()).migrate().await?;
        tracing::info!("Database migration complete ({} statements).", count);
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let service = OffloadService::new(
        db.clone(),
        Arc::new(S3Connector),
        SitePaths::new(&cfg.site_path),
    );

    if mode == RunMode::MigrateFiles {
        let report = service.migrate_existing_files().await?;
        tracing::info!(
            "Offloaded {} of {} attachments ({} skipped, {} failed)",
            report.migrated,
            report.attempted,
            report.skipped,
            report.failed.len()
        );
        for name in &report.failed {
            tracing::warn!("Attachment {} was not offloaded", name);
        }
        return Ok(());
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
