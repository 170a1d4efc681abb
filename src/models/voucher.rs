//! Generated voucher documents (invoices and the like) whose rendered PDF
//! is offloaded alongside regular attachments.

use chrono::NaiveDate;
use serde::Deserialize;

/// Identifies one voucher document.
#[derive(Deserialize, Clone, Debug)]
pub struct Voucher {
    /// Document type, e.g. `Sales Invoice`.
    pub voucher_type: String,

    /// Document name, e.g. `SINV-2021-00042`.
    pub name: String,

    /// Posting date; drives the year/month part of the key.
    pub posting_date: NaiveDate,
}

impl Voucher {
    /// File name of the rendered PDF: spaces dropped, `/` turned into `-`.
    pub fn pdf_file_name(&self) -> String {
        format!("{}.pdf", self.name).replace(' ', "").replace('/', "-")
    }
}
