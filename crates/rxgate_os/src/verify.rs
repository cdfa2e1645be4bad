#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rxgate_engines::docextract::{reason_codes as extract_codes, DocExtractRuntime};
use rxgate_engines::docstore::{
    object_name_for, reason_codes as store_codes, upload_object_name_for, DocStoreRuntime,
};
use rxgate_engines::matcher::subject_mentioned;
use rxgate_kernel_contracts::audit::{
    AuditEngine, AuditEventInput, AuditEventType, AuditPayloadMin, AuditSeverity, CorrelationId,
    PayloadKey, PayloadValue,
};
use rxgate_kernel_contracts::authz::{
    AuthorizationRecord, AuthorizationRecordInput, AuthorizationStatus, AuthzError, OwnerId,
    SubjectName, SubmitRequest, VerifyOk, VerifyRequest,
};
use rxgate_kernel_contracts::docextract::{
    DocExtractRequest, DocExtractResponse, DocumentPayload, ExtractedText,
};
use rxgate_kernel_contracts::docstore::{
    DocUploadRequest, DocUploadResponse, DocumentObjectName, StoredDocumentRef,
};
use rxgate_kernel_contracts::{MonotonicTimeNs, ReasonCodeId, Validate};
use rxgate_storage::repo::{AuditLedgerRepo, AuthorizationRecordRepo};

use crate::correlation::correlation_id_for;
use crate::gate::storage_detail;

pub mod reason_codes {
    use rxgate_kernel_contracts::ReasonCodeId;

    // VERIFY_PIPELINE reason-code namespace.
    pub const VERIFY_OK_APPROVED: ReasonCodeId = ReasonCodeId(0x5652_0001);
    pub const VERIFY_OK_REJECTED: ReasonCodeId = ReasonCodeId(0x5652_0002);
    pub const VERIFY_OK_PENDING_SUBMIT: ReasonCodeId = ReasonCodeId(0x5652_0003);

    pub const VERIFY_FAIL_PERSIST: ReasonCodeId = ReasonCodeId(0x5652_00F1);
}

/// The document verification pipeline. Steps run strictly in order: text
/// extraction, verdict, document upload, record write. Failure at any step
/// leaves the record store untouched; the document upload is the only write
/// that can land without a record (its ref is unreferenced in that case).
#[derive(Debug, Clone)]
pub struct VerifyPipeline {
    extract: DocExtractRuntime,
    docstore: DocStoreRuntime,
}

impl VerifyPipeline {
    pub fn new(extract: DocExtractRuntime, docstore: DocStoreRuntime) -> Self {
        Self { extract, docstore }
    }

    pub fn verify<S: AuthorizationRecordRepo + AuditLedgerRepo>(
        &self,
        store: &mut S,
        req: &VerifyRequest,
        now: MonotonicTimeNs,
    ) -> Result<VerifyOk, AuthzError> {
        let owner = req
            .identity
            .owner_id
            .as_ref()
            .ok_or(AuthzError::Unauthenticated)?
            .clone();
        let correlation_id = correlation_id_for(Some(&owner), &req.subject_name, now);

        if req.validate().is_err() {
            return Err(AuthzError::ExtractionFailed {
                reason_code: extract_codes::EXTRACT_FAIL_INPUT_SCHEMA_INVALID,
                detail: "verify request failed contract validation".to_string(),
            });
        }

        let text = self.extract_text(store, &owner, req, correlation_id, now)?;
        let matched = subject_mentioned(text.as_str(), req.subject_name.as_str());
        let status = if matched {
            AuthorizationStatus::Approved
        } else {
            AuthorizationStatus::Rejected
        };

        let object_name = object_name_for(&owner, now, &req.document).map_err(|_| {
            AuthzError::StorageUnavailable {
                reason_code: store_codes::STORE_FAIL_INPUT_SCHEMA_INVALID,
                detail: "object name failed contract validation".to_string(),
            }
        })?;
        let stored = self.upload_document(
            store,
            &owner,
            &req.subject_name,
            object_name,
            &req.document,
            correlation_id,
            now,
        )?;

        let input = AuthorizationRecordInput::v1(
            owner.clone(),
            req.subject_name.clone(),
            stored.document_ref.clone(),
            status,
            now,
        )
        .map_err(|_| AuthzError::PersistFailed {
            detail: "record input failed contract validation".to_string(),
        })?;

        let record_id = match store.insert_authorization_row(input) {
            Ok(id) => id,
            Err(err) => {
                let detail = storage_detail(&err);
                append_verify_audit(
                    store,
                    Some(owner),
                    &req.subject_name,
                    AuditEventType::PersistFail,
                    reason_codes::VERIFY_FAIL_PERSIST,
                    AuditSeverity::Error,
                    correlation_id,
                    now,
                    Some(&detail),
                );
                return Err(AuthzError::PersistFailed { detail });
            }
        };
        let record = store
            .authorization_row(&record_id)
            .cloned()
            .ok_or_else(|| AuthzError::PersistFailed {
                detail: "inserted row is not readable".to_string(),
            })?;

        let (event_type, reason_code, severity) = if matched {
            (
                AuditEventType::VerifyApproved,
                reason_codes::VERIFY_OK_APPROVED,
                AuditSeverity::Info,
            )
        } else {
            (
                AuditEventType::VerifyRejected,
                reason_codes::VERIFY_OK_REJECTED,
                AuditSeverity::Warn,
            )
        };
        append_verify_audit(
            store,
            Some(owner),
            &req.subject_name,
            event_type,
            reason_code,
            severity,
            correlation_id,
            now,
            Some(record.record_id.as_str()),
        );

        VerifyOk::v1(record, text, matched).map_err(|_| AuthzError::PersistFailed {
            detail: "verify output failed contract validation".to_string(),
        })
    }

    /// Plain upload for later review: the document lands in storage and a
    /// pending row is written without running extraction.
    pub fn submit_for_review<S: AuthorizationRecordRepo + AuditLedgerRepo>(
        &self,
        store: &mut S,
        req: &SubmitRequest,
        now: MonotonicTimeNs,
    ) -> Result<AuthorizationRecord, AuthzError> {
        let owner = req
            .identity
            .owner_id
            .as_ref()
            .ok_or(AuthzError::Unauthenticated)?
            .clone();
        let correlation_id = correlation_id_for(Some(&owner), &req.subject_name, now);

        if req.validate().is_err() {
            return Err(AuthzError::StorageUnavailable {
                reason_code: store_codes::STORE_FAIL_INPUT_SCHEMA_INVALID,
                detail: "submit request failed contract validation".to_string(),
            });
        }

        let object_name = upload_object_name_for(&owner, now, &req.document).map_err(|_| {
            AuthzError::StorageUnavailable {
                reason_code: store_codes::STORE_FAIL_INPUT_SCHEMA_INVALID,
                detail: "object name failed contract validation".to_string(),
            }
        })?;
        let stored = self.upload_document(
            store,
            &owner,
            &req.subject_name,
            object_name,
            &req.document,
            correlation_id,
            now,
        )?;

        let input = AuthorizationRecordInput::v1(
            owner.clone(),
            req.subject_name.clone(),
            stored.document_ref.clone(),
            AuthorizationStatus::Pending,
            now,
        )
        .map_err(|_| AuthzError::PersistFailed {
            detail: "record input failed contract validation".to_string(),
        })?;

        let record_id = match store.insert_authorization_row(input) {
            Ok(id) => id,
            Err(err) => {
                let detail = storage_detail(&err);
                append_verify_audit(
                    store,
                    Some(owner),
                    &req.subject_name,
                    AuditEventType::PersistFail,
                    reason_codes::VERIFY_FAIL_PERSIST,
                    AuditSeverity::Error,
                    correlation_id,
                    now,
                    Some(&detail),
                );
                return Err(AuthzError::PersistFailed { detail });
            }
        };
        let record = store
            .authorization_row(&record_id)
            .cloned()
            .ok_or_else(|| AuthzError::PersistFailed {
                detail: "inserted row is not readable".to_string(),
            })?;

        append_verify_audit(
            store,
            Some(owner),
            &req.subject_name,
            AuditEventType::SubmitPending,
            reason_codes::VERIFY_OK_PENDING_SUBMIT,
            AuditSeverity::Info,
            correlation_id,
            now,
            Some(record.record_id.as_str()),
        );
        Ok(record)
    }

    fn extract_text<S: AuditLedgerRepo>(
        &self,
        store: &mut S,
        owner: &OwnerId,
        req: &VerifyRequest,
        correlation_id: CorrelationId,
        now: MonotonicTimeNs,
    ) -> Result<ExtractedText, AuthzError> {
        let extract_req = DocExtractRequest::v1(
            correlation_id,
            req.document.clone(),
            req.language_hint.clone(),
        )
        .map_err(|_| AuthzError::ExtractionFailed {
            reason_code: extract_codes::EXTRACT_FAIL_INPUT_SCHEMA_INVALID,
            detail: "extract request failed contract validation".to_string(),
        })?;

        match self.extract.run(&extract_req) {
            DocExtractResponse::Ok(ok) => Ok(ok.text),
            DocExtractResponse::Refuse(refuse) => {
                append_verify_audit(
                    store,
                    Some(owner.clone()),
                    &req.subject_name,
                    AuditEventType::ExtractFail,
                    refuse.reason_code,
                    AuditSeverity::Error,
                    correlation_id,
                    now,
                    Some(&refuse.message),
                );
                Err(AuthzError::ExtractionFailed {
                    reason_code: refuse.reason_code,
                    detail: refuse.message,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_document<S: AuditLedgerRepo>(
        &self,
        store: &mut S,
        owner: &OwnerId,
        subject_name: &SubjectName,
        object_name: DocumentObjectName,
        document: &DocumentPayload,
        correlation_id: CorrelationId,
        now: MonotonicTimeNs,
    ) -> Result<StoredDocumentRef, AuthzError> {
        let upload_req = DocUploadRequest::v1(correlation_id, object_name, document.clone())
            .map_err(|_| AuthzError::StorageUnavailable {
                reason_code: store_codes::STORE_FAIL_INPUT_SCHEMA_INVALID,
                detail: "upload request failed contract validation".to_string(),
            })?;

        let stored = match self.docstore.run(&upload_req) {
            DocUploadResponse::Ok(ok) => ok.stored,
            DocUploadResponse::Refuse(refuse) => {
                append_verify_audit(
                    store,
                    Some(owner.clone()),
                    subject_name,
                    AuditEventType::UploadFail,
                    refuse.reason_code,
                    AuditSeverity::Error,
                    correlation_id,
                    now,
                    Some(&refuse.message),
                );
                return Err(AuthzError::StorageUnavailable {
                    reason_code: refuse.reason_code,
                    detail: refuse.message,
                });
            }
        };

        // The ref must be retrievable later; a ref that does not parse as an
        // absolute URL must never reach a persisted record.
        if url::Url::parse(stored.document_ref.as_str()).is_err() {
            let detail = "provider returned an unparseable document ref".to_string();
            append_verify_audit(
                store,
                Some(owner.clone()),
                subject_name,
                AuditEventType::UploadFail,
                store_codes::STORE_FAIL_REF_INVALID,
                AuditSeverity::Error,
                correlation_id,
                now,
                Some(&detail),
            );
            return Err(AuthzError::StorageUnavailable {
                reason_code: store_codes::STORE_FAIL_REF_INVALID,
                detail,
            });
        }
        Ok(stored)
    }
}

#[allow(clippy::too_many_arguments)]
fn append_verify_audit<S: AuditLedgerRepo>(
    store: &mut S,
    owner_id: Option<OwnerId>,
    subject_name: &SubjectName,
    event_type: AuditEventType,
    reason_code: ReasonCodeId,
    severity: AuditSeverity,
    correlation_id: CorrelationId,
    now: MonotonicTimeNs,
    detail: Option<&str>,
) {
    let Ok(payload) = verify_payload(subject_name, detail) else {
        return;
    };
    let Ok(input) = AuditEventInput::v1(
        now,
        owner_id,
        AuditEngine::VerifyPipeline,
        event_type,
        reason_code,
        severity,
        correlation_id,
        payload,
        None,
    ) else {
        return;
    };
    // The record write is the source of truth; a failed audit append must
    // not mask a committed verdict.
    let _ = store.append_audit_row(input);
}

fn verify_payload(
    subject_name: &SubjectName,
    detail: Option<&str>,
) -> Result<AuditPayloadMin, rxgate_kernel_contracts::ContractViolation> {
    let mut entries = BTreeMap::from([(
        PayloadKey::new("subject_name")?,
        PayloadValue::new(subject_name.as_str())?,
    )]);
    if let Some(detail) = detail {
        if !detail.is_empty() {
            entries.insert(PayloadKey::new("detail")?, PayloadValue::new(detail)?);
        }
    }
    AuditPayloadMin::v1(entries)
}
