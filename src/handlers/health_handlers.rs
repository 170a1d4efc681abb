//! Health & readiness handlers.
//!
//! - GET /api/method/attachments.ping -> literal "pong"
//! - GET /healthz                     -> simple liveness ("ok")
//! - GET /readyz                      -> readiness that checks DB connectivity and the site directory

use crate::services::offload_service::OffloadService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /api/method/attachments.ping`
pub async fn ping() -> &'static str {
    "pong"
}

/// `GET /healthz`
///
/// Liveness probe; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`) and loads the
///    settings singleton.
/// 2. Performs a best-effort write/delete in the site directory, where
///    not-yet-migrated files are read from and removed.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(service): State<OffloadService>) -> impl IntoResponse {
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(service.repo.pool())
        .await
    {
        Ok(1) => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let settings_check = match service.repo.load_settings().await {
        Ok(settings) if settings.has_credentials() => (true, None::<String>),
        Ok(_) => (true, Some("no credentials configured; offload disabled".to_string())),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let probe = service
        .site
        .root()
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let site_check = match fs::write(&probe, b"readyz").await {
        Ok(_) => match fs::remove_file(&probe).await {
            Ok(_) => (true, None::<String>),
            Err(e) => (true, Some(format!("could not remove probe file: {}", e))),
        },
        Err(e) => (false, Some(format!("could not write probe file: {}", e))),
    };

    let overall_ok = sqlite_check.0 && settings_check.0 && site_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_check.0,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "settings",
        CheckStatus {
            ok: settings_check.0,
            error: settings_check.1,
        },
    );
    checks.insert(
        "site",
        CheckStatus {
            ok: site_check.0,
            error: site_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
