#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rxgate_kernel_contracts::audit::{
    AuditEngine, AuditEventInput, AuditEventType, AuditPayloadMin, AuditSeverity, CorrelationId,
    PayloadKey, PayloadValue,
};
use rxgate_kernel_contracts::authz::{
    ApprovalCheckRequest, AuthzError, GateDecision, IdentityContext, OwnerId, SubjectName,
};
use rxgate_kernel_contracts::catalog::CatalogItem;
use rxgate_kernel_contracts::{MonotonicTimeNs, ReasonCodeId, Validate};
use rxgate_storage::repo::{AuditLedgerRepo, AuthorizationRecordRepo};
use rxgate_storage::store::StorageError;

use crate::correlation::correlation_id_for;

pub mod reason_codes {
    use rxgate_kernel_contracts::ReasonCodeId;

    // PURCHASE_GATE reason-code namespace.
    pub const GATE_PASS_NOT_GATED: ReasonCodeId = ReasonCodeId(0x4741_0001);
    pub const GATE_PASS_APPROVAL_FOUND: ReasonCodeId = ReasonCodeId(0x4741_0002);
    pub const GATE_BLOCK_NO_APPROVAL: ReasonCodeId = ReasonCodeId(0x4741_0003);

    pub const GATE_FAIL_UNAUTHENTICATED: ReasonCodeId = ReasonCodeId(0x4741_00F1);
    pub const GATE_FAIL_STORE_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4741_00F2);
}

/// Whether an item is prescription-gated is static catalog data.
pub fn requires_authorization(item: &CatalogItem) -> bool {
    item.requires_authorization
}

/// True iff at least one approved row exists for exactly this owner and
/// exactly this raw subject string. A store failure is surfaced as
/// `StoreUnavailable`, never folded into `false`: absence of a confirmed
/// approval blocks the purchase either way, but the caller must be able to
/// tell "no approval" from "could not check".
pub fn has_approval<S: AuthorizationRecordRepo>(
    store: &S,
    owner_id: &OwnerId,
    subject_name: &SubjectName,
) -> Result<bool, AuthzError> {
    match store.find_approved_row(owner_id, subject_name) {
        Ok(row) => Ok(row.is_some()),
        Err(err) => Err(AuthzError::StoreUnavailable {
            detail: storage_detail(&err),
        }),
    }
}

/// Caller-facing approval check: resolves identity, then delegates.
pub fn check_approval<S: AuthorizationRecordRepo>(
    store: &S,
    req: &ApprovalCheckRequest,
) -> Result<bool, AuthzError> {
    if req.validate().is_err() {
        return Err(AuthzError::Unauthenticated);
    }
    let owner = req
        .identity
        .owner_id
        .as_ref()
        .ok_or(AuthzError::Unauthenticated)?;
    has_approval(store, owner, &req.subject_name)
}

/// The purchase gate the surrounding shop calls before checkout. One audit
/// row per decision.
pub fn evaluate_purchase<S: AuthorizationRecordRepo + AuditLedgerRepo>(
    store: &mut S,
    identity: &IdentityContext,
    item: &CatalogItem,
    now: MonotonicTimeNs,
) -> Result<GateDecision, AuthzError> {
    let correlation_id = correlation_id_for(identity.owner_id.as_ref(), &item.display_name, now);

    let owner = match identity.owner_id.as_ref() {
        Some(owner) => owner.clone(),
        None => {
            append_gate_audit(
                store,
                None,
                item,
                AuditEventType::GateFail,
                reason_codes::GATE_FAIL_UNAUTHENTICATED,
                AuditSeverity::Error,
                correlation_id,
                now,
            );
            return Err(AuthzError::Unauthenticated);
        }
    };

    if !requires_authorization(item) {
        append_gate_audit(
            store,
            Some(owner),
            item,
            AuditEventType::GatePass,
            reason_codes::GATE_PASS_NOT_GATED,
            AuditSeverity::Info,
            correlation_id,
            now,
        );
        return Ok(GateDecision::Proceed);
    }

    match has_approval(store, &owner, &item.display_name) {
        Ok(true) => {
            append_gate_audit(
                store,
                Some(owner),
                item,
                AuditEventType::GatePass,
                reason_codes::GATE_PASS_APPROVAL_FOUND,
                AuditSeverity::Info,
                correlation_id,
                now,
            );
            Ok(GateDecision::Proceed)
        }
        Ok(false) => {
            append_gate_audit(
                store,
                Some(owner),
                item,
                AuditEventType::GateBlock,
                reason_codes::GATE_BLOCK_NO_APPROVAL,
                AuditSeverity::Warn,
                correlation_id,
                now,
            );
            Ok(GateDecision::AuthorizationRequired)
        }
        Err(err) => {
            append_gate_audit(
                store,
                Some(owner),
                item,
                AuditEventType::GateFail,
                reason_codes::GATE_FAIL_STORE_UNAVAILABLE,
                AuditSeverity::Error,
                correlation_id,
                now,
            );
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn append_gate_audit<S: AuditLedgerRepo>(
    store: &mut S,
    owner_id: Option<OwnerId>,
    item: &CatalogItem,
    event_type: AuditEventType,
    reason_code: ReasonCodeId,
    severity: AuditSeverity,
    correlation_id: CorrelationId,
    now: MonotonicTimeNs,
) {
    let Ok(payload) = gate_payload(item) else {
        return;
    };
    let Ok(input) = AuditEventInput::v1(
        now,
        owner_id,
        AuditEngine::PurchaseGate,
        event_type,
        reason_code,
        severity,
        correlation_id,
        payload,
        None,
    ) else {
        return;
    };
    // The gate decision is the source of truth; a failed audit append must
    // not change it.
    let _ = store.append_audit_row(input);
}

fn gate_payload(
    item: &CatalogItem,
) -> Result<AuditPayloadMin, rxgate_kernel_contracts::ContractViolation> {
    AuditPayloadMin::v1(BTreeMap::from([
        (
            PayloadKey::new("item_id")?,
            PayloadValue::new(item.item_id.as_str())?,
        ),
        (
            PayloadKey::new("subject_name")?,
            PayloadValue::new(item.display_name.as_str())?,
        ),
    ]))
}

pub(crate) fn storage_detail(err: &StorageError) -> String {
    match err {
        StorageError::DuplicateKey { table, key } => {
            format!("duplicate_key table={table} key={key}")
        }
        StorageError::ContractViolation(_) => "contract_violation".to_string(),
        StorageError::Unavailable { table } => format!("unavailable table={table}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxgate_kernel_contracts::audit::{AuditEvent, AuditEventId};
    use rxgate_kernel_contracts::authz::{
        AuthorizationRecord, AuthorizationRecordId, AuthorizationRecordInput, AuthorizationStatus,
        DocumentRef,
    };
    use rxgate_kernel_contracts::catalog::CatalogItemId;
    use rxgate_storage::store::RxGateStore;

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    fn subject(name: &str) -> SubjectName {
        SubjectName::new(name).unwrap()
    }

    fn gated_item(name: &str) -> CatalogItem {
        CatalogItem::v1(
            CatalogItemId::new("med-042").unwrap(),
            subject(name),
            12_50,
            true,
        )
        .unwrap()
    }

    fn open_item() -> CatalogItem {
        CatalogItem::v1(
            CatalogItemId::new("vit-001").unwrap(),
            subject("Vitamin C 500mg"),
            4_99,
            false,
        )
        .unwrap()
    }

    fn approved_row(store: &mut RxGateStore, subject_name: &str, at: u64) {
        store
            .insert_authorization_row(
                AuthorizationRecordInput::v1(
                    owner(),
                    subject(subject_name),
                    DocumentRef::new("https://docstore.rxgate.local/public/a.png").unwrap(),
                    AuthorizationStatus::Approved,
                    MonotonicTimeNs(at),
                )
                .unwrap(),
            )
            .unwrap();
    }

    /// Repo double standing in for an unreachable persistence collaborator.
    struct UnreachableStore;

    impl AuthorizationRecordRepo for UnreachableStore {
        fn insert_authorization_row(
            &mut self,
            _input: AuthorizationRecordInput,
        ) -> Result<AuthorizationRecordId, StorageError> {
            Err(StorageError::Unavailable {
                table: "authorization_rows",
            })
        }

        fn authorization_row(
            &self,
            _record_id: &AuthorizationRecordId,
        ) -> Option<&AuthorizationRecord> {
            None
        }

        fn find_approved_row(
            &self,
            _owner_id: &OwnerId,
            _subject_name: &SubjectName,
        ) -> Result<Option<&AuthorizationRecord>, StorageError> {
            Err(StorageError::Unavailable {
                table: "authorization_rows",
            })
        }

        fn authorization_rows_by_owner(
            &self,
            _owner_id: &OwnerId,
        ) -> Result<Vec<&AuthorizationRecord>, StorageError> {
            Err(StorageError::Unavailable {
                table: "authorization_rows",
            })
        }

        fn authorization_rows(&self) -> &[AuthorizationRecord] {
            &[]
        }
    }

    impl AuditLedgerRepo for UnreachableStore {
        fn append_audit_row(
            &mut self,
            _input: AuditEventInput,
        ) -> Result<AuditEventId, StorageError> {
            Err(StorageError::Unavailable {
                table: "audit_rows",
            })
        }

        fn audit_rows(&self) -> &[AuditEvent] {
            &[]
        }

        fn audit_rows_by_correlation(&self, _correlation_id: CorrelationId) -> Vec<&AuditEvent> {
            Vec::new()
        }
    }

    #[test]
    fn non_gated_item_proceeds_even_when_store_is_down() {
        let mut store = UnreachableStore;
        let decision = evaluate_purchase(
            &mut store,
            &IdentityContext::authenticated(owner()),
            &open_item(),
            MonotonicTimeNs(1),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::Proceed);
    }

    #[test]
    fn gated_item_without_approval_is_blocked_and_audited() {
        let mut store = RxGateStore::new_in_memory();
        let decision = evaluate_purchase(
            &mut store,
            &IdentityContext::authenticated(owner()),
            &gated_item("Amoxicillin"),
            MonotonicTimeNs(1),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::AuthorizationRequired);
        assert_eq!(store.audit_rows().len(), 1);
        assert_eq!(store.audit_rows()[0].event_type, AuditEventType::GateBlock);
        assert_eq!(
            store.audit_rows()[0].reason_code,
            reason_codes::GATE_BLOCK_NO_APPROVAL
        );
    }

    #[test]
    fn gated_item_with_approval_proceeds() {
        let mut store = RxGateStore::new_in_memory();
        approved_row(&mut store, "Amoxicillin", 10);
        let decision = evaluate_purchase(
            &mut store,
            &IdentityContext::authenticated(owner()),
            &gated_item("Amoxicillin"),
            MonotonicTimeNs(20),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::Proceed);
        assert_eq!(store.audit_rows()[0].event_type, AuditEventType::GatePass);
    }

    #[test]
    fn approval_does_not_leak_across_subjects() {
        let mut store = RxGateStore::new_in_memory();
        approved_row(&mut store, "Amoxicillin", 10);
        assert!(has_approval(&store, &owner(), &subject("Amoxicillin")).unwrap());
        assert!(!has_approval(&store, &owner(), &subject("Paracetamol 500mg")).unwrap());
    }

    #[test]
    fn unreachable_store_fails_closed_not_false() {
        let store = UnreachableStore;
        match has_approval(&store, &owner(), &subject("Amoxicillin")) {
            Err(AuthzError::StoreUnavailable { .. }) => {}
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn gated_purchase_propagates_store_failure() {
        let mut store = UnreachableStore;
        match evaluate_purchase(
            &mut store,
            &IdentityContext::authenticated(owner()),
            &gated_item("Amoxicillin"),
            MonotonicTimeNs(1),
        ) {
            Err(AuthzError::StoreUnavailable { .. }) => {}
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn anonymous_purchase_is_unauthenticated() {
        let mut store = RxGateStore::new_in_memory();
        match evaluate_purchase(
            &mut store,
            &IdentityContext::anonymous(),
            &gated_item("Amoxicillin"),
            MonotonicTimeNs(1),
        ) {
            Err(AuthzError::Unauthenticated) => {}
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
        assert_eq!(store.audit_rows()[0].event_type, AuditEventType::GateFail);
    }

    #[test]
    fn check_approval_requires_identity() {
        let store = RxGateStore::new_in_memory();
        let req = ApprovalCheckRequest::v1(IdentityContext::anonymous(), subject("Amoxicillin"))
            .unwrap();
        match check_approval(&store, &req) {
            Err(AuthzError::Unauthenticated) => {}
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
    }
}
