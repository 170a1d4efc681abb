//! Defines routes for the attachment offload service.
//!
//! ## Structure
//! - **Host-facing method endpoints**
//!   - `GET  /api/method/attachments.generate_file?key=` : presigned redirect
//!   - `POST /api/method/attachments.migrate_existing_files` : batch offload
//!   - `GET  /api/method/attachments.ping` : health probe
//!
//! - **Hooks invoked by the host**
//!   - `POST /hooks/file-created` : offload a new attachment
//!   - `POST /hooks/file-deleted` : drop the object of a deleted attachment
//!
//! - **Content and vouchers**
//!   - `GET         /files/{name}/content` : stream an attachment's bytes
//!   - `POST|DELETE /vouchers/pdf` : offload or delete a voucher PDF

use crate::{
    handlers::{
        file_handlers::{
            file_content, file_created, file_deleted, generate_file, migrate_existing_files,
        },
        health_handlers::{healthz, ping, readyz},
        voucher_handlers::{delete_voucher_pdf, upload_voucher_pdf},
    },
    services::{offload_service::OffloadService, rewriter::REDIRECT_ENDPOINT},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. Every handler shares the `OffloadService` state.
pub fn routes() -> Router<OffloadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/method/attachments.ping", get(ping))
        // read path
        .route(REDIRECT_ENDPOINT, get(generate_file))
        .route("/files/{name}/content", get(file_content))
        // host hooks and batch trigger
        .route(
            "/api/method/attachments.migrate_existing_files",
            post(migrate_existing_files),
        )
        .route("/hooks/file-created", post(file_created))
        .route("/hooks/file-deleted", post(file_deleted))
        .route(
            "/vouchers/pdf",
            post(upload_voucher_pdf).delete(delete_voucher_pdf),
        )
}
