#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rxgate_kernel_contracts::audit::{
    AuditEngine, AuditEventInput, AuditEventType, AuditPayloadMin, AuditSeverity, CorrelationId,
    PayloadKey, PayloadValue,
};
use rxgate_kernel_contracts::authz::OwnerId;
use rxgate_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use rxgate_storage::store::RxGateStore;

fn payload(subject: &str) -> AuditPayloadMin {
    AuditPayloadMin::v1(BTreeMap::from([(
        PayloadKey::new("subject_name").unwrap(),
        PayloadValue::new(subject).unwrap(),
    )]))
    .unwrap()
}

fn event(
    at: u64,
    correlation: u64,
    event_type: AuditEventType,
    idempotency_key: Option<&str>,
) -> AuditEventInput {
    AuditEventInput::v1(
        MonotonicTimeNs(at),
        Some(OwnerId::new("u1").unwrap()),
        AuditEngine::VerifyPipeline,
        event_type,
        ReasonCodeId(0x5652_0001),
        AuditSeverity::Info,
        CorrelationId(correlation),
        payload("Paracetamol 500mg"),
        idempotency_key.map(str::to_string),
    )
    .unwrap()
}

#[test]
fn at_audit_db_01_ids_are_monotonic_and_rows_append_only() {
    let mut s = RxGateStore::new_in_memory();
    let a = s
        .append_audit_row(event(1, 100, AuditEventType::VerifyApproved, None))
        .unwrap();
    let b = s
        .append_audit_row(event(2, 100, AuditEventType::VerifyRejected, None))
        .unwrap();

    assert!(b.0 > a.0);
    assert_eq!(s.audit_rows().len(), 2);
    assert_eq!(s.audit_rows()[0].audit_event_id, a);
    assert_eq!(s.audit_rows()[1].audit_event_id, b);
}

#[test]
fn at_audit_db_02_idempotency_key_returns_original_row() {
    let mut s = RxGateStore::new_in_memory();
    let a = s
        .append_audit_row(event(1, 100, AuditEventType::VerifyApproved, Some("idem_1")))
        .unwrap();
    let b = s
        .append_audit_row(event(9, 100, AuditEventType::VerifyApproved, Some("idem_1")))
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(s.audit_rows().len(), 1);
}

#[test]
fn at_audit_db_03_rows_filter_by_correlation() {
    let mut s = RxGateStore::new_in_memory();
    s.append_audit_row(event(1, 100, AuditEventType::VerifyApproved, None))
        .unwrap();
    s.append_audit_row(event(2, 200, AuditEventType::GateBlock, None))
        .unwrap();
    s.append_audit_row(event(3, 100, AuditEventType::GatePass, None))
        .unwrap();

    let rows = s.audit_rows_by_correlation(CorrelationId(100));
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|e| e.correlation_id == CorrelationId(100)));
}
