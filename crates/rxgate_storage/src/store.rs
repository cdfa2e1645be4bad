#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use rxgate_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput, CorrelationId};
use rxgate_kernel_contracts::authz::{
    AuthorizationRecord, AuthorizationRecordId, AuthorizationRecordInput, AuthorizationStatus,
    OwnerId, SubjectName,
};
use rxgate_kernel_contracts::{ContractViolation, Validate};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey { table: &'static str, key: String },
    ContractViolation(ContractViolation),
    /// The persistence collaborator could not be reached. Never produced by
    /// the in-memory tables; remote-backed repo impls report transport
    /// failures through this variant so callers can fail closed.
    Unavailable { table: &'static str },
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// In-memory tables: an append-only authorization ledger with an
/// approved-pair projection, and an append-only audit ledger.
#[derive(Debug, Clone)]
pub struct RxGateStore {
    authorization_rows: Vec<AuthorizationRecord>,
    authorization_ids: BTreeSet<AuthorizationRecordId>,
    approved_pairs: BTreeSet<(OwnerId, SubjectName)>,
    audit_rows: Vec<AuditEvent>,
    audit_idempotency: BTreeMap<String, AuditEventId>,
    next_audit_event_id: u64,
}

impl RxGateStore {
    pub fn new_in_memory() -> Self {
        Self {
            authorization_rows: Vec::new(),
            authorization_ids: BTreeSet::new(),
            approved_pairs: BTreeSet::new(),
            audit_rows: Vec::new(),
            audit_idempotency: BTreeMap::new(),
            next_audit_event_id: 1,
        }
    }

    pub fn insert_authorization_row(
        &mut self,
        input: AuthorizationRecordInput,
    ) -> Result<AuthorizationRecordId, StorageError> {
        input.validate()?;

        let seq = self.authorization_rows.len() as u64;
        let record_id = record_id_for(&input, seq)?;
        if self.authorization_ids.contains(&record_id) {
            return Err(StorageError::DuplicateKey {
                table: "authorization_rows",
                key: record_id.as_str().to_string(),
            });
        }

        let record = AuthorizationRecord::v1(
            record_id.clone(),
            input.owner_id,
            input.subject_name,
            input.document_ref,
            input.status,
            input.created_at,
        )?;
        if record.status == AuthorizationStatus::Approved {
            self.approved_pairs
                .insert((record.owner_id.clone(), record.subject_name.clone()));
        }
        self.authorization_ids.insert(record_id.clone());
        self.authorization_rows.push(record);
        Ok(record_id)
    }

    pub fn authorization_row(
        &self,
        record_id: &AuthorizationRecordId,
    ) -> Option<&AuthorizationRecord> {
        self.authorization_rows
            .iter()
            .find(|r| &r.record_id == record_id)
    }

    pub fn find_approved_row(
        &self,
        owner_id: &OwnerId,
        subject_name: &SubjectName,
    ) -> Result<Option<&AuthorizationRecord>, StorageError> {
        if !self
            .approved_pairs
            .contains(&(owner_id.clone(), subject_name.clone()))
        {
            return Ok(None);
        }
        Ok(self.authorization_rows.iter().rev().find(|r| {
            r.status == AuthorizationStatus::Approved
                && &r.owner_id == owner_id
                && &r.subject_name == subject_name
        }))
    }

    /// Newest first, matching how the owner-facing listing renders.
    pub fn authorization_rows_by_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<&AuthorizationRecord>, StorageError> {
        let mut rows: Vec<&AuthorizationRecord> = self
            .authorization_rows
            .iter()
            .filter(|r| &r.owner_id == owner_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    pub fn authorization_rows(&self) -> &[AuthorizationRecord] {
        &self.authorization_rows
    }

    pub fn rebuild_approved_pairs(&mut self) {
        self.approved_pairs = self
            .authorization_rows
            .iter()
            .filter(|r| r.status == AuthorizationStatus::Approved)
            .map(|r| (r.owner_id.clone(), r.subject_name.clone()))
            .collect();
    }

    /// Appending the same idempotency key again returns the original row id
    /// without growing the ledger.
    pub fn append_audit_row(
        &mut self,
        input: AuditEventInput,
    ) -> Result<AuditEventId, StorageError> {
        input.validate()?;

        if let Some(key) = &input.idempotency_key {
            if let Some(existing) = self.audit_idempotency.get(key) {
                return Ok(*existing);
            }
        }

        let audit_event_id = AuditEventId(self.next_audit_event_id);
        self.next_audit_event_id += 1;
        if let Some(key) = &input.idempotency_key {
            self.audit_idempotency.insert(key.clone(), audit_event_id);
        }
        self.audit_rows.push(AuditEvent::from_input(audit_event_id, input));
        Ok(audit_event_id)
    }

    pub fn audit_rows(&self) -> &[AuditEvent] {
        &self.audit_rows
    }

    pub fn audit_rows_by_correlation(&self, correlation_id: CorrelationId) -> Vec<&AuditEvent> {
        self.audit_rows
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .collect()
    }
}

fn record_id_for(
    input: &AuthorizationRecordInput,
    seq: u64,
) -> Result<AuthorizationRecordId, ContractViolation> {
    let mut hasher = Sha256::new();
    hasher.update(input.owner_id.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(input.subject_name.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(input.created_at.0.to_be_bytes());
    hasher.update(seq.to_be_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    AuthorizationRecordId::new(format!("rx_{hex}"))
}
