#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::docextract::{DocumentPayload, ExtractedText, LanguageHint};
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const AUTHZ_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must not be empty",
            });
        }
        if id.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must be <= 128 chars",
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must contain only ascii alphanumerics, '_' or '-'",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for OwnerId {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

/// Free-text name of the gated item a document is claimed to authorize.
/// The raw string is preserved: the approval-existence check compares it
/// exactly, while the verification verdict canonicalizes a copy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectName(String);

impl SubjectName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "subject_name",
                reason: "must not be empty",
            });
        }
        if name.len() > 200 {
            return Err(ContractViolation::InvalidValue {
                field: "subject_name",
                reason: "must be <= 200 chars",
            });
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(ContractViolation::InvalidValue {
                field: "subject_name",
                reason: "must not contain control characters",
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SubjectName {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuthorizationRecordId(String);

impl AuthorizationRecordId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "authorization_record_id",
                reason: "must not be empty",
            });
        }
        if id.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "authorization_record_id",
                reason: "must be <= 64 chars",
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "authorization_record_id",
                reason: "must be lowercase ascii, digits or '_'",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for AuthorizationRecordId {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

/// Durable reference to a stored document, as handed back by the storage
/// collaborator. Syntactic checks only; the pipeline re-parses it as an
/// absolute URL before persisting a record that points at it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "document_ref",
                reason: "must not be empty",
            });
        }
        if raw.len() > 512 {
            return Err(ContractViolation::InvalidValue {
                field: "document_ref",
                reason: "must be <= 512 chars",
            });
        }
        if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ContractViolation::InvalidValue {
                field: "document_ref",
                reason: "must not contain whitespace or control characters",
            });
        }
        if !raw.contains("://") {
            return Err(ContractViolation::InvalidValue {
                field: "document_ref",
                reason: "must carry a scheme",
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DocumentRef {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Approved,
    Rejected,
}

impl AuthorizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::Approved => "approved",
            AuthorizationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AuthorizationStatus::Pending)
    }

    /// The only legal moves: pending resolves to a terminal status. Terminal
    /// rows never move again. Resolution of pending rows belongs to the
    /// external review collaborator; this core only states the rule.
    pub fn can_transition_to(self, next: AuthorizationStatus) -> bool {
        matches!(
            (self, next),
            (
                AuthorizationStatus::Pending,
                AuthorizationStatus::Approved | AuthorizationStatus::Rejected
            )
        )
    }
}

/// One verification attempt, durable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub schema_version: SchemaVersion,
    pub record_id: AuthorizationRecordId,
    pub owner_id: OwnerId,
    pub subject_name: SubjectName,
    pub document_ref: DocumentRef,
    pub status: AuthorizationStatus,
    pub created_at: MonotonicTimeNs,
}

impl AuthorizationRecord {
    pub fn v1(
        record_id: AuthorizationRecordId,
        owner_id: OwnerId,
        subject_name: SubjectName,
        document_ref: DocumentRef,
        status: AuthorizationStatus,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            record_id,
            owner_id,
            subject_name,
            document_ref,
            status,
            created_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for AuthorizationRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "authorization_record.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.record_id.validate()?;
        self.owner_id.validate()?;
        self.subject_name.validate()?;
        self.document_ref.validate()
    }
}

/// Insert-side shape: the record id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecordInput {
    pub schema_version: SchemaVersion,
    pub owner_id: OwnerId,
    pub subject_name: SubjectName,
    pub document_ref: DocumentRef,
    pub status: AuthorizationStatus,
    pub created_at: MonotonicTimeNs,
}

impl AuthorizationRecordInput {
    pub fn v1(
        owner_id: OwnerId,
        subject_name: SubjectName,
        document_ref: DocumentRef,
        status: AuthorizationStatus,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            owner_id,
            subject_name,
            document_ref,
            status,
            created_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for AuthorizationRecordInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "authorization_record_input.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.owner_id.validate()?;
        self.subject_name.validate()?;
        self.document_ref.validate()
    }
}

/// Caller-resolved identity, passed explicitly into every operation so the
/// core stays testable without a simulated session. A missing owner is a
/// runtime `Unauthenticated` failure, not a contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    pub owner_id: Option<OwnerId>,
}

impl IdentityContext {
    pub fn authenticated(owner_id: OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id),
        }
    }

    pub fn anonymous() -> Self {
        Self { owner_id: None }
    }
}

impl Validate for IdentityContext {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(owner) = &self.owner_id {
            owner.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyRequest {
    pub schema_version: SchemaVersion,
    pub identity: IdentityContext,
    pub subject_name: SubjectName,
    pub document: DocumentPayload,
    pub language_hint: LanguageHint,
}

impl VerifyRequest {
    pub fn v1(
        identity: IdentityContext,
        subject_name: SubjectName,
        document: DocumentPayload,
        language_hint: LanguageHint,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            identity,
            subject_name,
            document,
            language_hint,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for VerifyRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "verify_request.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.identity.validate()?;
        self.subject_name.validate()?;
        self.document.validate()?;
        self.language_hint.validate()
    }
}

/// Plain upload for later review: no extraction runs, the row lands pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub schema_version: SchemaVersion,
    pub identity: IdentityContext,
    pub subject_name: SubjectName,
    pub document: DocumentPayload,
}

impl SubmitRequest {
    pub fn v1(
        identity: IdentityContext,
        subject_name: SubjectName,
        document: DocumentPayload,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            identity,
            subject_name,
            document,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SubmitRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "submit_request.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.identity.validate()?;
        self.subject_name.validate()?;
        self.document.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalCheckRequest {
    pub schema_version: SchemaVersion,
    pub identity: IdentityContext,
    pub subject_name: SubjectName,
}

impl ApprovalCheckRequest {
    pub fn v1(
        identity: IdentityContext,
        subject_name: SubjectName,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            identity,
            subject_name,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ApprovalCheckRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "approval_check_request.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.identity.validate()?;
        self.subject_name.validate()
    }
}

/// Successful verification outcome. The raw extracted text rides along for
/// caller display; the record itself never stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOk {
    pub schema_version: SchemaVersion,
    pub record: AuthorizationRecord,
    pub extracted_text: ExtractedText,
    pub matched: bool,
}

impl VerifyOk {
    pub fn v1(
        record: AuthorizationRecord,
        extracted_text: ExtractedText,
        matched: bool,
    ) -> Result<Self, ContractViolation> {
        let o = Self {
            schema_version: AUTHZ_CONTRACT_VERSION,
            record,
            extracted_text,
            matched,
        };
        o.validate()?;
        Ok(o)
    }
}

impl Validate for VerifyOk {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUTHZ_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "verify_ok.schema_version",
                reason: "must match AUTHZ_CONTRACT_VERSION",
            });
        }
        self.record.validate()?;
        self.extracted_text.validate()?;
        if !self.record.status.is_terminal() {
            return Err(ContractViolation::InvalidValue {
                field: "verify_ok.record.status",
                reason: "must be terminal",
            });
        }
        let expected = if self.matched {
            AuthorizationStatus::Approved
        } else {
            AuthorizationStatus::Rejected
        };
        if self.record.status != expected {
            return Err(ContractViolation::InvalidValue {
                field: "verify_ok.matched",
                reason: "must agree with record.status",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    AuthorizationRequired,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            GateDecision::Proceed => "PROCEED",
            GateDecision::AuthorizationRequired => "AUTHORIZATION_REQUIRED",
        }
    }
}

/// Caller-facing failure taxonomy. Every variant is fail-closed with respect
/// to purchase authorization: none of them may be read as "no approval
/// needed" or as a silent false.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthzError {
    Unauthenticated,
    StoreUnavailable {
        detail: String,
    },
    ExtractionFailed {
        reason_code: ReasonCodeId,
        detail: String,
    },
    StorageUnavailable {
        reason_code: ReasonCodeId,
        detail: String,
    },
    PersistFailed {
        detail: String,
    },
}

impl AuthzError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::Unauthenticated => "unauthenticated",
            AuthzError::StoreUnavailable { .. } => "store_unavailable",
            AuthzError::ExtractionFailed { .. } => "extraction_failed",
            AuthzError::StorageUnavailable { .. } => "storage_unavailable",
            AuthzError::PersistFailed { .. } => "persist_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docextract::DocumentKind;

    fn owner() -> OwnerId {
        OwnerId::new("user_1").unwrap()
    }

    fn subject() -> SubjectName {
        SubjectName::new("Paracetamol 500mg").unwrap()
    }

    fn doc_ref() -> DocumentRef {
        DocumentRef::new("https://store.example/prescriptions/a1.png").unwrap()
    }

    #[test]
    fn owner_id_rejects_whitespace() {
        assert!(OwnerId::new("user 1").is_err());
        assert!(OwnerId::new("").is_err());
        assert!(OwnerId::new("9f8d-4c").is_ok());
    }

    #[test]
    fn subject_name_preserves_raw_text() {
        let s = SubjectName::new("  Paracetamol  500mg ").unwrap();
        assert_eq!(s.as_str(), "  Paracetamol  500mg ");
    }

    #[test]
    fn document_ref_requires_scheme() {
        assert!(DocumentRef::new("store.example/a1.png").is_err());
        assert!(DocumentRef::new("https://store.example/a1.png").is_ok());
    }

    #[test]
    fn status_transitions_only_pending_to_terminal() {
        use AuthorizationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
    }

    #[test]
    fn record_roundtrips_through_v1() {
        let r = AuthorizationRecord::v1(
            AuthorizationRecordId::new("rx_0a1b2c3d4e5f6071").unwrap(),
            owner(),
            subject(),
            doc_ref(),
            AuthorizationStatus::Approved,
            MonotonicTimeNs(42),
        )
        .unwrap();
        assert!(r.validate().is_ok());
        assert_eq!(r.status.as_str(), "approved");
    }

    #[test]
    fn verify_ok_requires_terminal_status() {
        let record = AuthorizationRecord::v1(
            AuthorizationRecordId::new("rx_0a1b2c3d4e5f6071").unwrap(),
            owner(),
            subject(),
            doc_ref(),
            AuthorizationStatus::Pending,
            MonotonicTimeNs(42),
        )
        .unwrap();
        let text = ExtractedText::new("paracetamol 500mg").unwrap();
        assert!(VerifyOk::v1(record, text, false).is_err());
    }

    #[test]
    fn verify_ok_matched_must_agree_with_status() {
        let record = AuthorizationRecord::v1(
            AuthorizationRecordId::new("rx_0a1b2c3d4e5f6071").unwrap(),
            owner(),
            subject(),
            doc_ref(),
            AuthorizationStatus::Rejected,
            MonotonicTimeNs(42),
        )
        .unwrap();
        let text = ExtractedText::new("ibuprofen 200mg").unwrap();
        assert!(VerifyOk::v1(record.clone(), text.clone(), true).is_err());
        assert!(VerifyOk::v1(record, text, false).is_ok());
    }

    #[test]
    fn verify_request_carries_identity_explicitly() {
        let doc = DocumentPayload::v1(DocumentKind::Png, vec![0x89, 0x50, 0x4e, 0x47]).unwrap();
        let req = VerifyRequest::v1(
            IdentityContext::authenticated(owner()),
            subject(),
            doc,
            LanguageHint::eng(),
        )
        .unwrap();
        assert_eq!(req.identity.owner_id.as_ref().unwrap().as_str(), "user_1");
    }
}
