// Stored Document Domain Model
//
// Documents are never rows: they exist only as keys in the object store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Document numbers, batch ids and tenant external ids become key segments and
/// lookup tokens: non-empty ASCII alphanumerics or '-'.
pub fn is_path_segment(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Blob category inside a period directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Xml,
    Zip,
    Report,
}

impl DocumentKind {
    /// Directory segment under `{tenant}/{yyyy}/{mm}/{tenant}/`
    pub fn dir(&self) -> &'static str {
        match self {
            DocumentKind::Xml => "xml",
            DocumentKind::Zip => "zip",
            DocumentKind::Report => "reports",
        }
    }

    /// File name prefix; the lookup token is `{prefix}_{number}_`
    pub fn file_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Xml | DocumentKind::Zip => "nfse",
            DocumentKind::Report => "report",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Xml => "xml",
            DocumentKind::Zip => "zip",
            DocumentKind::Report => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentKind::Xml => "application/xml",
            DocumentKind::Zip => "application/zip",
            DocumentKind::Report => "application/json",
        }
    }

    /// Map an upstream content type onto a storable kind (XML unless clearly a ZIP)
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("zip") {
            DocumentKind::Zip
        } else {
            DocumentKind::Xml
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "xml" => Some(DocumentKind::Xml),
            "zip" => Some(DocumentKind::Zip),
            "json" => Some(DocumentKind::Report),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir())
    }
}

/// A document as returned by the external fiscal API
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub number: String,
    pub emission_date: NaiveDate,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FetchedDocument {
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_content_type(&self.content_type)
    }
}

/// What the organizer needs to place a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDescriptor {
    pub number: String,
    pub emission_date: NaiveDate,
    pub kind: DocumentKind,
}

impl From<&FetchedDocument> for DocumentDescriptor {
    fn from(doc: &FetchedDocument) -> Self {
        Self {
            number: doc.number.clone(),
            emission_date: doc.emission_date,
            kind: doc.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(DocumentKind::from_content_type("application/zip"), DocumentKind::Zip);
        assert_eq!(
            DocumentKind::from_content_type("application/x-zip-compressed"),
            DocumentKind::Zip
        );
        assert_eq!(DocumentKind::from_content_type("text/xml"), DocumentKind::Xml);
        assert_eq!(DocumentKind::from_content_type(""), DocumentKind::Xml);
    }
}
