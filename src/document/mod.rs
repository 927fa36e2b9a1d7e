//! Document classes, their extraction schemas, and document loading.
//!
//! Every class is bound to a fixed list of fields. Extraction prompts are
//! built from these fields and extracted records are normalised against
//! them. [`DocumentClass::Unknown`] has no schema and accepts any key.

pub mod classifier;
pub mod loader;

pub use classifier::{ClassificationFault, DocumentClassifier, HeuristicClassifier};
pub use loader::{DocumentLoader, LoaderError, LocalDocumentLoader, Segment};

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Extensions accepted when nothing else is configured.
pub const DEFAULT_SUPPORTED_FORMATS: &[&str] = &[
    ".pdf", ".png", ".jpg", ".jpeg", ".tiff", ".bmp", ".docx", ".doc", ".txt",
];

/// Lower-cased extension of `path` with its leading dot, or an empty string.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Value type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    List,
}

impl FieldKind {
    /// JSON type name used in prompts.
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::List => "array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

const fn field(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        description,
    }
}

const INVOICE_FIELDS: &[FieldSpec] = &[
    field("invoice_number", FieldKind::String, "Unique invoice identifier"),
    field("invoice_date", FieldKind::String, "Date of the invoice"),
    field("total_amount", FieldKind::Number, "Overall total amount"),
    field("vendor_name", FieldKind::String, "Name of the vendor/supplier"),
    field("customer_name", FieldKind::String, "Name of the customer/buyer"),
    field("line_items", FieldKind::List, "List of invoice line items"),
];

const DRIVER_LICENSE_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::String, "Full name on the license"),
    field("age", FieldKind::Integer, "Age of the license holder"),
    field("license_number", FieldKind::String, "License number"),
    field("expiration_date", FieldKind::String, "License expiration date"),
    field("state", FieldKind::String, "Issuing state"),
    field("address", FieldKind::String, "Address on license"),
];

const PASSPORT_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::String, "Full name on passport"),
    field("passport_number", FieldKind::String, "Passport number"),
    field("nationality", FieldKind::String, "Nationality"),
    field("date_of_birth", FieldKind::String, "Date of birth"),
    field("expiration_date", FieldKind::String, "Passport expiration date"),
    field("issuing_country", FieldKind::String, "Country that issued the passport"),
];

const BUSINESS_CARD_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::String, "Person's name"),
    field("title", FieldKind::String, "Job title"),
    field("company", FieldKind::String, "Company name"),
    field("email", FieldKind::String, "Email address"),
    field("phone", FieldKind::String, "Phone number"),
    field("address", FieldKind::String, "Business address"),
];

/// Closed set of document classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentClass {
    Invoice,
    #[serde(rename = "Driver License")]
    DriverLicense,
    Passport,
    #[serde(rename = "Business Card")]
    BusinessCard,
    Unknown,
}

impl DocumentClass {
    /// Every class with a schema, in classification order.
    pub const KNOWN: [Self; 4] = [
        Self::Invoice,
        Self::DriverLicense,
        Self::Passport,
        Self::BusinessCard,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::DriverLicense => "Driver License",
            Self::Passport => "Passport",
            Self::BusinessCard => "Business Card",
            Self::Unknown => "Unknown",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Invoice => "This is an invoice document with billing information",
            Self::DriverLicense => {
                "This is a driver license document with personal identification"
            }
            Self::Passport => "This is a passport document with travel identification",
            Self::BusinessCard => "This is a business card with contact information",
            Self::Unknown => "A document of unrecognised type",
        }
    }

    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            Self::Invoice => INVOICE_FIELDS,
            Self::DriverLicense => DRIVER_LICENSE_FIELDS,
            Self::Passport => PASSPORT_FIELDS,
            Self::BusinessCard => BUSINESS_CARD_FIELDS,
            Self::Unknown => &[],
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.schema().iter().find(|spec| spec.name == name)
    }

    /// Parse a display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::KNOWN
            .into_iter()
            .chain(std::iter::once(Self::Unknown))
            .find(|class| class.name().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for class in DocumentClass::KNOWN {
            assert_eq!(DocumentClass::from_name(class.name()), Some(class));
        }
        assert_eq!(
            DocumentClass::from_name("driver license"),
            Some(DocumentClass::DriverLicense)
        );
        assert_eq!(DocumentClass::from_name("receipt"), None);
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&DocumentClass::BusinessCard).unwrap();
        assert_eq!(json, "\"Business Card\"");
    }

    #[test]
    fn test_schemas() {
        assert_eq!(DocumentClass::Invoice.schema().len(), 6);
        assert_eq!(
            DocumentClass::Invoice.field("total_amount").map(|f| f.kind),
            Some(FieldKind::Number)
        );
        assert_eq!(
            DocumentClass::DriverLicense.field("age").map(|f| f.kind),
            Some(FieldKind::Integer)
        );
        assert!(DocumentClass::Unknown.schema().is_empty());
    }

    #[test]
    fn test_normalized_extension() {
        assert_eq!(normalized_extension(Path::new("a/B.PDF")), ".pdf");
        assert_eq!(normalized_extension(Path::new("noext")), "");
    }
}
