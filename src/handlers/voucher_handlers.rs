//! Voucher PDF endpoints. The host renders the PDF and posts its bytes; the
//! service stores it under a posting-date key and hands back the reference.

use crate::{errors::AppError, models::voucher::Voucher, services::offload_service::OffloadService};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct VoucherPdfQuery {
    pub voucher_type: String,
    pub name: String,
    pub posting_date: NaiveDate,
    /// Private unless stated otherwise.
    pub is_private: Option<bool>,
}

impl VoucherPdfQuery {
    fn voucher(&self) -> Voucher {
        Voucher {
            voucher_type: self.voucher_type.clone(),
            name: self.name.clone(),
            posting_date: self.posting_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoucherPdfResponse {
    /// `None` when offload is disabled for lack of credentials.
    pub reference: Option<String>,
}

/// `POST /vouchers/pdf?voucher_type=&name=&posting_date=&is_private=`
pub async fn upload_voucher_pdf(
    State(service): State<OffloadService>,
    Query(q): Query<VoucherPdfQuery>,
    body: Bytes,
) -> Result<Json<VoucherPdfResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "PDF body is empty"));
    }
    let reference = service
        .upload_voucher_pdf(&q.voucher(), &body, q.is_private.unwrap_or(true))
        .await?;
    Ok(Json(VoucherPdfResponse { reference }))
}

/// `DELETE /vouchers/pdf?voucher_type=&name=&posting_date=`
pub async fn delete_voucher_pdf(
    State(service): State<OffloadService>,
    Query(voucher): Query<Voucher>,
) -> Result<StatusCode, AppError> {
    service.delete_voucher_pdf(&voucher).await?;
    Ok(StatusCode::NO_CONTENT)
}
