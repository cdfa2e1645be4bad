#![forbid(unsafe_code)]

use rxgate_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput, CorrelationId};
use rxgate_kernel_contracts::authz::{
    AuthorizationRecord, AuthorizationRecordId, AuthorizationRecordInput, OwnerId, SubjectName,
};

use crate::store::{RxGateStore, StorageError};

/// Typed repository interface for the authorization record tables. This is
/// the command/query boundary over the external persistence collaborator;
/// the in-memory store backs tests and single-process wiring, a remote
/// impl reports transport failures as `StorageError::Unavailable`.
pub trait AuthorizationRecordRepo {
    fn insert_authorization_row(
        &mut self,
        input: AuthorizationRecordInput,
    ) -> Result<AuthorizationRecordId, StorageError>;
    fn authorization_row(&self, record_id: &AuthorizationRecordId)
        -> Option<&AuthorizationRecord>;
    fn find_approved_row(
        &self,
        owner_id: &OwnerId,
        subject_name: &SubjectName,
    ) -> Result<Option<&AuthorizationRecord>, StorageError>;
    fn authorization_rows_by_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<&AuthorizationRecord>, StorageError>;
    fn authorization_rows(&self) -> &[AuthorizationRecord];
}

/// Typed repository interface for append-only audit persistence.
pub trait AuditLedgerRepo {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError>;
    fn audit_rows(&self) -> &[AuditEvent];
    fn audit_rows_by_correlation(&self, correlation_id: CorrelationId) -> Vec<&AuditEvent>;
}

impl AuthorizationRecordRepo for RxGateStore {
    fn insert_authorization_row(
        &mut self,
        input: AuthorizationRecordInput,
    ) -> Result<AuthorizationRecordId, StorageError> {
        RxGateStore::insert_authorization_row(self, input)
    }

    fn authorization_row(
        &self,
        record_id: &AuthorizationRecordId,
    ) -> Option<&AuthorizationRecord> {
        RxGateStore::authorization_row(self, record_id)
    }

    fn find_approved_row(
        &self,
        owner_id: &OwnerId,
        subject_name: &SubjectName,
    ) -> Result<Option<&AuthorizationRecord>, StorageError> {
        RxGateStore::find_approved_row(self, owner_id, subject_name)
    }

    fn authorization_rows_by_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<&AuthorizationRecord>, StorageError> {
        RxGateStore::authorization_rows_by_owner(self, owner_id)
    }

    fn authorization_rows(&self) -> &[AuthorizationRecord] {
        RxGateStore::authorization_rows(self)
    }
}

impl AuditLedgerRepo for RxGateStore {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError> {
        RxGateStore::append_audit_row(self, input)
    }

    fn audit_rows(&self) -> &[AuditEvent] {
        RxGateStore::audit_rows(self)
    }

    fn audit_rows_by_correlation(&self, correlation_id: CorrelationId) -> Vec<&AuditEvent> {
        RxGateStore::audit_rows_by_correlation(self, correlation_id)
    }
}
