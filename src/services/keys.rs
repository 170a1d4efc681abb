//! Object key generation.
//!
//! General attachment keys look like
//! `{root}/{yyyy}/{mm}/{dd}/{owner type}/{XXXXXXXX}_{file name}`, where the
//! eight-character disambiguator keeps same-day, same-name uploads apart.
//! An owning entity may declare its own folder, which replaces the whole
//! dated prefix. Voucher PDF keys are derived from the posting date instead
//! and carry no disambiguator.

use chrono::{Datelike, Local, NaiveDate};
use rand::Rng;

/// Length of the random token inserted before the file name.
pub const DISAMBIGUATOR_LEN: usize = 8;

const DISAMBIGUATOR_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Where the directory part of a key comes from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource<'a> {
    /// The owning entity declared a folder; it wins over everything else.
    Override(&'a str),
    /// Date-based layout, optionally under a root folder and owner type.
    Dated {
        root: Option<&'a str>,
        owner_type: Option<&'a str>,
    },
}

impl<'a> PathSource<'a> {
    /// Pick the path source for a key. Blank override paths count as absent.
    pub fn resolve(
        override_path: Option<&'a str>,
        root: Option<&'a str>,
        owner_type: Option<&'a str>,
    ) -> Self {
        match override_path
            .map(|p| p.trim_matches('/'))
            .filter(|p| !sanitize_path(p).is_empty())
        {
            Some(path) => PathSource::Override(path),
            None => PathSource::Dated {
                root: root.filter(|r| !r.is_empty()),
                owner_type: owner_type.filter(|t| !t.is_empty()),
            },
        }
    }

    fn prefix(&self, date: NaiveDate) -> String {
        match self {
            PathSource::Override(path) => sanitize_path(path),
            PathSource::Dated { root, owner_type } => {
                let mut segments: Vec<String> = Vec::with_capacity(5);
                if let Some(root) = root.map(sanitize_path).filter(|r| !r.is_empty()) {
                    segments.push(root);
                }
                segments.push(format!("{:04}", date.year()));
                segments.push(format!("{:02}", date.month()));
                segments.push(format!("{:02}", date.day()));
                if let Some(owner_type) = owner_type.map(sanitize).filter(|t| !t.is_empty()) {
                    segments.push(owner_type);
                }
                segments.join("/")
            }
        }
    }
}

/// Replace spaces with underscores and drop every character outside
/// `[0-9a-zA-Z._-]`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Sanitize each `/`-separated segment, dropping the ones left empty.
pub fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(sanitize)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Random uppercase alphanumeric token of [`DISAMBIGUATOR_LEN`] characters.
pub fn disambiguator<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..DISAMBIGUATOR_LEN)
        .map(|_| {
            let idx = rng.random_range(0..DISAMBIGUATOR_CHARSET.len());
            DISAMBIGUATOR_CHARSET[idx] as char
        })
        .collect()
}

/// Build a key from an explicit date and random source.
pub fn generate_key_with<R: Rng + ?Sized>(
    rng: &mut R,
    date: NaiveDate,
    source: PathSource<'_>,
    file_name: &str,
) -> String {
    format!(
        "{}/{}_{}",
        source.prefix(date),
        disambiguator(rng),
        sanitize(file_name)
    )
}

/// Build a key for a file uploaded today.
pub fn generate_key(source: PathSource<'_>, file_name: &str) -> String {
    generate_key_with(
        &mut rand::rng(),
        Local::now().date_naive(),
        source,
        file_name,
    )
}

/// Key for a rendered voucher PDF: `{root}/{yyyy}/{mm}/{Voucher_Type}/{file}`.
///
/// Every `tmp` substring is removed from the file name before sanitizing,
/// matching keys produced for PDFs rendered into temp files. The voucher
/// type only has spaces replaced with underscores; any other character
/// outside `[0-9a-zA-Z._-]` in it passes through unchanged.
///
/// Two vouchers of the same type whose sanitized file names coincide within
/// a month map to the same key, and the later upload replaces the earlier.
pub fn generate_voucher_key(
    voucher_type: &str,
    posting_date: NaiveDate,
    root: Option<&str>,
    file_name: &str,
) -> String {
    let file_name = sanitize(&file_name.replace(' ', "_").replace("tmp", ""));
    let mut segments: Vec<String> = Vec::with_capacity(5);
    if let Some(root) = root.map(sanitize_path).filter(|r| !r.is_empty()) {
        segments.push(root);
    }
    segments.push(format!("{:04}", posting_date.year()));
    segments.push(format!("{:02}", posting_date.month()));
    segments.push(voucher_type.replace(' ', "_"));
    segments.push(file_name);
    segments.join("/")
}
