// Deterministic object keys for stored documents
//
// {tenant}/{yyyy}/{mm}/{tenant}/{kind_dir}/{prefix}_{number}_{yyyymmdd}[_v{n}].{ext}

use crate::domain::{is_path_segment, DocumentKind, Period};
use crate::error::{AppError, Result};
use chrono::NaiveDate;

/// Directory under each kind directory holding supersession audit markers
pub const SUPERSEDED_DIR: &str = "superseded";

/// `{tenant}/{yyyy}/{mm}/{tenant}`
pub fn period_prefix(tenant: &str, period: Period) -> String {
    format!(
        "{}/{:04}/{}/{}",
        tenant,
        period.year(),
        period.month_padded(),
        tenant
    )
}

/// `{tenant}/{yyyy}/{mm}/{tenant}/{kind_dir}/`
pub fn kind_prefix(tenant: &str, period: Period, kind: DocumentKind) -> String {
    format!("{}/{}/", period_prefix(tenant, period), kind.dir())
}

/// Lookup token; always ends in `_` so `nfse_12_` never matches `nfse_123_`
pub fn number_token(kind: DocumentKind, number: &str) -> String {
    format!("{}_{}_", kind.file_prefix(), number)
}

/// Version 1 is the canonical (unsuffixed) name
pub fn file_name(kind: DocumentKind, number: &str, date: NaiveDate, version: u32) -> String {
    let suffix = if version > 1 {
        format!("_v{}", version)
    } else {
        String::new()
    };
    format!(
        "{}{}{}.{}",
        number_token(kind, number),
        date.format("%Y%m%d"),
        suffix,
        kind.extension()
    )
}

/// Canonical key for a document
pub fn build_path(
    tenant: &str,
    period: Period,
    number: &str,
    emission_date: NaiveDate,
    kind: DocumentKind,
) -> Result<String> {
    versioned_path(tenant, period, number, emission_date, kind, 1)
}

pub fn versioned_path(
    tenant: &str,
    period: Period,
    number: &str,
    emission_date: NaiveDate,
    kind: DocumentKind,
    version: u32,
) -> Result<String> {
    validate_segment("tenant", tenant)?;
    validate_segment("document number", number)?;
    Ok(format!(
        "{}{}",
        kind_prefix(tenant, period, kind),
        file_name(kind, number, emission_date, version)
    ))
}

/// Audit marker recorded when `superseded_file` is replaced by a newer version
pub fn superseded_marker_path(
    tenant: &str,
    period: Period,
    kind: DocumentKind,
    superseded_file: &str,
) -> String {
    format!(
        "{}{}/{}.json",
        kind_prefix(tenant, period, kind),
        SUPERSEDED_DIR,
        superseded_file
    )
}

/// Version of a stored file for `number`, or None if the name belongs to another number
/// or is not a document file
pub fn parse_version(kind: DocumentKind, number: &str, file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(&number_token(kind, number))?;
    let stem = rest.strip_suffix(&format!(".{}", kind.extension()))?;

    match stem.split_once("_v") {
        None if is_date_stamp(stem) => Some(1),
        Some((date, version)) if is_date_stamp(date) => version.parse().ok().filter(|v| *v > 1),
        _ => None,
    }
}

fn is_date_stamp(s: &str) -> bool {
    s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Tenant ids, document numbers and batch ids become path segments and lookup tokens
pub fn validate_segment(what: &str, value: &str) -> Result<()> {
    if is_path_segment(value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be non-empty ASCII alphanumerics or '-': '{}'",
            what, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 14).unwrap()
    }

    fn period() -> Period {
        "2025-08".parse().unwrap()
    }

    #[test]
    fn test_build_path_layout() {
        let key = build_path("12345678000199", period(), "1001", date(), DocumentKind::Xml).unwrap();
        assert_eq!(
            key,
            "12345678000199/2025/08/12345678000199/xml/nfse_1001_20250814.xml"
        );

        let key = build_path("12345678000199", period(), "1001", date(), DocumentKind::Zip).unwrap();
        assert!(key.ends_with("/zip/nfse_1001_20250814.zip"));
    }

    #[test]
    fn test_build_path_is_deterministic() {
        let a = build_path("t", period(), "7", date(), DocumentKind::Xml).unwrap();
        let b = build_path("t", period(), "7", date(), DocumentKind::Xml).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_versioned_name() {
        assert_eq!(
            file_name(DocumentKind::Xml, "1001", date(), 3),
            "nfse_1001_20250814_v3.xml"
        );
        assert_eq!(
            file_name(DocumentKind::Report, "batch-1", date(), 1),
            "report_batch-1_20250814.json"
        );
    }

    #[test]
    fn test_parse_version_is_token_safe() {
        let kind = DocumentKind::Xml;
        assert_eq!(parse_version(kind, "12", "nfse_12_20250814.xml"), Some(1));
        assert_eq!(parse_version(kind, "12", "nfse_12_20250814_v4.xml"), Some(4));
        assert_eq!(parse_version(kind, "12", "nfse_123_20250814.xml"), None);
        assert_eq!(parse_version(kind, "123", "nfse_12_20250814.xml"), None);
        assert_eq!(parse_version(kind, "12", "nfse_12_20250814.zip"), None);
        assert_eq!(parse_version(kind, "12", "nfse_12_2025.xml"), None);
    }

    #[test]
    fn test_rejects_unsafe_segments() {
        assert!(build_path("t", period(), "../x", date(), DocumentKind::Xml).is_err());
        assert!(build_path("t", period(), "1_2", date(), DocumentKind::Xml).is_err());
        assert!(build_path("", period(), "1", date(), DocumentKind::Xml).is_err());
    }

    #[test]
    fn test_marker_path() {
        assert_eq!(
            superseded_marker_path("t", period(), DocumentKind::Xml, "nfse_1_20250814.xml"),
            "t/2025/08/t/xml/superseded/nfse_1_20250814.xml.json"
        );
    }
}
