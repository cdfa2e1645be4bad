#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::audit::CorrelationId;
use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};

pub const DOCEXTRACT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Hard ceiling on an uploaded document. Large scans are the collaborator's
/// problem to downscale before they reach this core.
pub const MAX_DOCUMENT_BYTES: usize = 8 * 1024 * 1024;

pub const MAX_EXTRACTED_CHARS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Png,
    Jpeg,
    Pdf,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Png => "png",
            DocumentKind::Jpeg => "jpeg",
            DocumentKind::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Pdf => "application/pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub schema_version: SchemaVersion,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl DocumentPayload {
    pub fn v1(kind: DocumentKind, bytes: Vec<u8>) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: DOCEXTRACT_CONTRACT_VERSION,
            kind,
            bytes,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for DocumentPayload {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCEXTRACT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "document_payload.schema_version",
                reason: "must match DOCEXTRACT_CONTRACT_VERSION",
            });
        }
        if self.bytes.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "document_payload.bytes",
                reason: "must not be empty",
            });
        }
        if self.bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(ContractViolation::InvalidValue {
                field: "document_payload.bytes",
                reason: "must be <= MAX_DOCUMENT_BYTES",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LanguageHint(String);

impl LanguageHint {
    pub fn new(tag: impl Into<String>) -> Result<Self, ContractViolation> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "language_hint",
                reason: "must not be empty",
            });
        }
        if tag.len() > 16 {
            return Err(ContractViolation::InvalidValue {
                field: "language_hint",
                reason: "must be <= 16 chars",
            });
        }
        if !tag.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ContractViolation::InvalidValue {
                field: "language_hint",
                reason: "must be lowercase ascii letters",
            });
        }
        Ok(Self(tag))
    }

    /// Default hint, matching the collaborator's traineddata naming.
    pub fn eng() -> Self {
        Self("eng".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for LanguageHint {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

/// Recognized text. Newlines and tabs are expected from page layout; all
/// other control characters are refused at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Result<Self, ContractViolation> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "extracted_text",
                reason: "must not be empty",
            });
        }
        if text.chars().count() > MAX_EXTRACTED_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "extracted_text",
                reason: "must be <= MAX_EXTRACTED_CHARS",
            });
        }
        if text
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
        {
            return Err(ContractViolation::InvalidValue {
                field: "extracted_text",
                reason: "must not contain control characters beyond layout",
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ExtractedText {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocExtractRequest {
    pub schema_version: SchemaVersion,
    pub correlation_id: CorrelationId,
    pub document: DocumentPayload,
    pub language_hint: LanguageHint,
}

impl DocExtractRequest {
    pub fn v1(
        correlation_id: CorrelationId,
        document: DocumentPayload,
        language_hint: LanguageHint,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: DOCEXTRACT_CONTRACT_VERSION,
            correlation_id,
            document,
            language_hint,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for DocExtractRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCEXTRACT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_extract_request.schema_version",
                reason: "must match DOCEXTRACT_CONTRACT_VERSION",
            });
        }
        self.correlation_id.validate()?;
        self.document.validate()?;
        self.language_hint.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocExtractOk {
    pub schema_version: SchemaVersion,
    pub reason_code: ReasonCodeId,
    pub text: ExtractedText,
    pub provider_hint: Option<String>,
}

impl DocExtractOk {
    pub fn v1(
        reason_code: ReasonCodeId,
        text: ExtractedText,
        provider_hint: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let o = Self {
            schema_version: DOCEXTRACT_CONTRACT_VERSION,
            reason_code,
            text,
            provider_hint,
        };
        o.validate()?;
        Ok(o)
    }
}

impl Validate for DocExtractOk {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCEXTRACT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_extract_ok.schema_version",
                reason: "must match DOCEXTRACT_CONTRACT_VERSION",
            });
        }
        self.text.validate()?;
        if let Some(hint) = &self.provider_hint {
            if hint.is_empty() || hint.len() > 64 {
                return Err(ContractViolation::InvalidValue {
                    field: "doc_extract_ok.provider_hint",
                    reason: "must be 1..=64 chars when present",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocExtractRefuse {
    pub schema_version: SchemaVersion,
    pub reason_code: ReasonCodeId,
    pub message: String,
}

impl DocExtractRefuse {
    pub fn v1(reason_code: ReasonCodeId, message: String) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: DOCEXTRACT_CONTRACT_VERSION,
            reason_code,
            message,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for DocExtractRefuse {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCEXTRACT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_extract_refuse.schema_version",
                reason: "must match DOCEXTRACT_CONTRACT_VERSION",
            });
        }
        if self.message.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "doc_extract_refuse.message",
                reason: "must not be empty",
            });
        }
        if self.message.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "doc_extract_refuse.message",
                reason: "must be <= 256 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocExtractResponse {
    Ok(DocExtractOk),
    Refuse(DocExtractRefuse),
}

impl Validate for DocExtractResponse {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            DocExtractResponse::Ok(o) => o.validate(),
            DocExtractResponse::Refuse(r) => r.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_empty_bytes() {
        assert!(DocumentPayload::v1(DocumentKind::Png, vec![]).is_err());
    }

    #[test]
    fn language_hint_rejects_uppercase() {
        assert!(LanguageHint::new("ENG").is_err());
        assert_eq!(LanguageHint::eng().as_str(), "eng");
    }

    #[test]
    fn extracted_text_allows_layout_controls_only() {
        assert!(ExtractedText::new("Rx:\nParacetamol 500mg\ttwice daily").is_ok());
        assert!(ExtractedText::new("bad\u{0007}bell").is_err());
        assert!(ExtractedText::new("   ").is_err());
    }

    #[test]
    fn extract_ok_bounds_provider_hint() {
        let text = ExtractedText::new("some text").unwrap();
        let hint = Some("x".repeat(65));
        assert!(DocExtractOk::v1(ReasonCodeId(1), text, hint).is_err());
    }

    #[test]
    fn refuse_requires_message() {
        assert!(DocExtractRefuse::v1(ReasonCodeId(1), "  ".to_string()).is_err());
    }
}
