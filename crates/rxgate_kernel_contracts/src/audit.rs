#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::authz::OwnerId;
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditEventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl Validate for CorrelationId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "correlation_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Which part of the service emitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditEngine {
    PurchaseGate,
    VerifyPipeline,
    DocExtract,
    DocStore,
    RecordStore,
}

impl AuditEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEngine::PurchaseGate => "PURCHASE_GATE",
            AuditEngine::VerifyPipeline => "VERIFY_PIPELINE",
            AuditEngine::DocExtract => "DOC_EXTRACT",
            AuditEngine::DocStore => "DOC_STORE",
            AuditEngine::RecordStore => "RECORD_STORE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    GatePass,
    GateBlock,
    GateFail,
    VerifyApproved,
    VerifyRejected,
    SubmitPending,
    ExtractFail,
    UploadFail,
    PersistFail,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::GatePass => "GATE_PASS",
            AuditEventType::GateBlock => "GATE_BLOCK",
            AuditEventType::GateFail => "GATE_FAIL",
            AuditEventType::VerifyApproved => "VERIFY_APPROVED",
            AuditEventType::VerifyRejected => "VERIFY_REJECTED",
            AuditEventType::SubmitPending => "SUBMIT_PENDING",
            AuditEventType::ExtractFail => "EXTRACT_FAIL",
            AuditEventType::UploadFail => "UPLOAD_FAIL",
            AuditEventType::PersistFail => "PERSIST_FAIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayloadKey(String);

impl PayloadKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let key = key.into();
        if key.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must not be empty",
            });
        }
        if key.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be <= 64 chars",
            });
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be lowercase snake_case ascii",
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayloadValue(String);

impl PayloadValue {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into();
        if value.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must not be empty",
            });
        }
        if value.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must be <= 256 chars",
            });
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must not contain control characters",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Minimal structured payload. Bounded so audit rows stay cheap to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPayloadMin {
    pub schema_version: SchemaVersion,
    pub entries: BTreeMap<PayloadKey, PayloadValue>,
}

impl AuditPayloadMin {
    pub fn v1(entries: BTreeMap<PayloadKey, PayloadValue>) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            entries,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn empty() -> Self {
        Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Validate for AuditPayloadMin {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        if self.entries.len() > 16 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.entries",
                reason: "must be <= 16 entries",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEventInput {
    pub schema_version: SchemaVersion,
    pub occurred_at: MonotonicTimeNs,
    pub owner_id: Option<OwnerId>,
    pub engine: AuditEngine,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    pub severity: AuditSeverity,
    pub correlation_id: CorrelationId,
    pub payload: AuditPayloadMin,
    pub idempotency_key: Option<String>,
}

impl AuditEventInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        occurred_at: MonotonicTimeNs,
        owner_id: Option<OwnerId>,
        engine: AuditEngine,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        severity: AuditSeverity,
        correlation_id: CorrelationId,
        payload: AuditPayloadMin,
        idempotency_key: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            occurred_at,
            owner_id,
            engine,
            event_type,
            reason_code,
            severity,
            correlation_id,
            payload,
            idempotency_key,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for AuditEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        if let Some(owner) = &self.owner_id {
            owner.validate()?;
        }
        self.correlation_id.validate()?;
        self.payload.validate()?;
        if let Some(key) = &self.idempotency_key {
            if key.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_event_input.idempotency_key",
                    reason: "must not be empty when present",
                });
            }
            if key.len() > 128 {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_event_input.idempotency_key",
                    reason: "must be <= 128 chars",
                });
            }
        }
        Ok(())
    }
}

/// A persisted audit row. The ledger id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub audit_event_id: AuditEventId,
    pub occurred_at: MonotonicTimeNs,
    pub owner_id: Option<OwnerId>,
    pub engine: AuditEngine,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    pub severity: AuditSeverity,
    pub correlation_id: CorrelationId,
    pub payload: AuditPayloadMin,
    pub idempotency_key: Option<String>,
}

impl AuditEvent {
    pub fn from_input(audit_event_id: AuditEventId, input: AuditEventInput) -> Self {
        Self {
            audit_event_id,
            occurred_at: input.occurred_at,
            owner_id: input.owner_id,
            engine: input.engine,
            event_type: input.event_type,
            reason_code: input.reason_code,
            severity: input.severity,
            correlation_id: input.correlation_id,
            payload: input.payload,
            idempotency_key: input.idempotency_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_rejects_zero() {
        assert!(CorrelationId(0).validate().is_err());
        assert!(CorrelationId(7).validate().is_ok());
    }

    #[test]
    fn payload_key_rejects_uppercase() {
        assert!(PayloadKey::new("Subject").is_err());
        assert!(PayloadKey::new("subject_name").is_ok());
    }

    #[test]
    fn payload_is_bounded() {
        let mut entries = BTreeMap::new();
        for i in 0..17 {
            entries.insert(
                PayloadKey::new(format!("k{i}")).unwrap(),
                PayloadValue::new("v").unwrap(),
            );
        }
        assert!(AuditPayloadMin::v1(entries).is_err());
    }

    #[test]
    fn input_rejects_empty_idempotency_key() {
        let input = AuditEventInput::v1(
            MonotonicTimeNs(1),
            None,
            AuditEngine::PurchaseGate,
            AuditEventType::GatePass,
            ReasonCodeId(1),
            AuditSeverity::Info,
            CorrelationId(1),
            AuditPayloadMin::empty(),
            Some(String::new()),
        );
        assert!(input.is_err());
    }
}
