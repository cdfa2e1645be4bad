#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::audit::CorrelationId;
use crate::authz::DocumentRef;
use crate::docextract::DocumentPayload;
use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};

pub const DOCSTORE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Caller-chosen unique name for the stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentObjectName(String);

impl DocumentObjectName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        if name.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "document_object_name",
                reason: "must not be empty",
            });
        }
        if name.len() > 200 {
            return Err(ContractViolation::InvalidValue {
                field: "document_object_name",
                reason: "must be <= 200 chars",
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ContractViolation::InvalidValue {
                field: "document_object_name",
                reason: "must contain only ascii alphanumerics, '_', '-' or '.'",
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DocumentObjectName {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

/// What a successful upload hands back: the durable ref plus enough metadata
/// to audit what exactly was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocumentRef {
    pub schema_version: SchemaVersion,
    pub document_ref: DocumentRef,
    pub object_name: DocumentObjectName,
    pub content_sha256_hex: String,
}

impl StoredDocumentRef {
    pub fn v1(
        document_ref: DocumentRef,
        object_name: DocumentObjectName,
        content_sha256_hex: String,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            schema_version: DOCSTORE_CONTRACT_VERSION,
            document_ref,
            object_name,
            content_sha256_hex,
        };
        s.validate()?;
        Ok(s)
    }
}

impl Validate for StoredDocumentRef {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCSTORE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "stored_document_ref.schema_version",
                reason: "must match DOCSTORE_CONTRACT_VERSION",
            });
        }
        self.document_ref.validate()?;
        self.object_name.validate()?;
        if self.content_sha256_hex.len() != 64
            || !self
                .content_sha256_hex
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ContractViolation::InvalidValue {
                field: "stored_document_ref.content_sha256_hex",
                reason: "must be 64 lowercase hex chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocUploadRequest {
    pub schema_version: SchemaVersion,
    pub correlation_id: CorrelationId,
    pub object_name: DocumentObjectName,
    pub document: DocumentPayload,
}

impl DocUploadRequest {
    pub fn v1(
        correlation_id: CorrelationId,
        object_name: DocumentObjectName,
        document: DocumentPayload,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: DOCSTORE_CONTRACT_VERSION,
            correlation_id,
            object_name,
            document,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for DocUploadRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCSTORE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_upload_request.schema_version",
                reason: "must match DOCSTORE_CONTRACT_VERSION",
            });
        }
        self.correlation_id.validate()?;
        self.object_name.validate()?;
        self.document.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocUploadOk {
    pub schema_version: SchemaVersion,
    pub reason_code: ReasonCodeId,
    pub stored: StoredDocumentRef,
}

impl DocUploadOk {
    pub fn v1(
        reason_code: ReasonCodeId,
        stored: StoredDocumentRef,
    ) -> Result<Self, ContractViolation> {
        let o = Self {
            schema_version: DOCSTORE_CONTRACT_VERSION,
            reason_code,
            stored,
        };
        o.validate()?;
        Ok(o)
    }
}

impl Validate for DocUploadOk {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCSTORE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_upload_ok.schema_version",
                reason: "must match DOCSTORE_CONTRACT_VERSION",
            });
        }
        self.stored.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocUploadRefuse {
    pub schema_version: SchemaVersion,
    pub reason_code: ReasonCodeId,
    pub message: String,
}

impl DocUploadRefuse {
    pub fn v1(reason_code: ReasonCodeId, message: String) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: DOCSTORE_CONTRACT_VERSION,
            reason_code,
            message,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for DocUploadRefuse {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DOCSTORE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "doc_upload_refuse.schema_version",
                reason: "must match DOCSTORE_CONTRACT_VERSION",
            });
        }
        if self.message.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "doc_upload_refuse.message",
                reason: "must not be empty",
            });
        }
        if self.message.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "doc_upload_refuse.message",
                reason: "must be <= 256 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocUploadResponse {
    Ok(DocUploadOk),
    Refuse(DocUploadRefuse),
}

impl Validate for DocUploadResponse {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            DocUploadResponse::Ok(o) => o.validate(),
            DocUploadResponse::Refuse(r) => r.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docextract::DocumentKind;

    #[test]
    fn object_name_rejects_path_separators() {
        assert!(DocumentObjectName::new("a/b.png").is_err());
        assert!(DocumentObjectName::new("verification_user_1_42_ab12cd34.png").is_ok());
    }

    #[test]
    fn stored_ref_requires_lowercase_hex_digest() {
        let r = StoredDocumentRef::v1(
            DocumentRef::new("https://store.example/a.png").unwrap(),
            DocumentObjectName::new("a.png").unwrap(),
            "AB".repeat(32),
        );
        assert!(r.is_err());
        let ok = StoredDocumentRef::v1(
            DocumentRef::new("https://store.example/a.png").unwrap(),
            DocumentObjectName::new("a.png").unwrap(),
            "ab".repeat(32),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn upload_request_validates_document() {
        let req = DocUploadRequest::v1(
            CorrelationId(1),
            DocumentObjectName::new("a.png").unwrap(),
            DocumentPayload {
                schema_version: DOCSTORE_CONTRACT_VERSION,
                kind: DocumentKind::Png,
                bytes: vec![],
            },
        );
        assert!(req.is_err());
    }
}
