#![forbid(unsafe_code)]

use rxgate_kernel_contracts::authz::{
    AuthorizationRecordInput, AuthorizationStatus, DocumentRef, OwnerId, SubjectName,
    AUTHZ_CONTRACT_VERSION,
};
use rxgate_kernel_contracts::{MonotonicTimeNs, SchemaVersion};
use rxgate_storage::store::{RxGateStore, StorageError};

fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

fn subject(name: &str) -> SubjectName {
    SubjectName::new(name).unwrap()
}

fn row(
    owner_id: &str,
    subject_name: &str,
    status: AuthorizationStatus,
    at: u64,
) -> AuthorizationRecordInput {
    AuthorizationRecordInput::v1(
        owner(owner_id),
        subject(subject_name),
        DocumentRef::new(format!(
            "https://docstore.rxgate.local/public/prescriptions/{owner_id}_{at}.png"
        ))
        .unwrap(),
        status,
        MonotonicTimeNs(at),
    )
    .unwrap()
}

#[test]
fn at_authz_db_01_find_approved_requires_exact_owner_and_subject() {
    let mut s = RxGateStore::new_in_memory();
    s.insert_authorization_row(row("u1", "Paracetamol 500mg", AuthorizationStatus::Approved, 10))
        .unwrap();

    assert!(s
        .find_approved_row(&owner("u1"), &subject("Paracetamol 500mg"))
        .unwrap()
        .is_some());
    // Exact raw-string comparison: case variation does not satisfy the check.
    assert!(s
        .find_approved_row(&owner("u1"), &subject("paracetamol 500mg"))
        .unwrap()
        .is_none());
    assert!(s
        .find_approved_row(&owner("u2"), &subject("Paracetamol 500mg"))
        .unwrap()
        .is_none());
}

#[test]
fn at_authz_db_02_rejected_and_pending_rows_never_satisfy_the_check() {
    let mut s = RxGateStore::new_in_memory();
    s.insert_authorization_row(row("u1", "Amoxicillin", AuthorizationStatus::Rejected, 10))
        .unwrap();
    s.insert_authorization_row(row("u1", "Amoxicillin", AuthorizationStatus::Pending, 11))
        .unwrap();

    assert!(s
        .find_approved_row(&owner("u1"), &subject("Amoxicillin"))
        .unwrap()
        .is_none());
}

#[test]
fn at_authz_db_03_conflicting_rows_per_pair_coexist() {
    let mut s = RxGateStore::new_in_memory();
    s.insert_authorization_row(row("u1", "Amoxicillin", AuthorizationStatus::Rejected, 10))
        .unwrap();
    s.insert_authorization_row(row("u1", "Amoxicillin", AuthorizationStatus::Approved, 20))
        .unwrap();

    // Any one approved row satisfies the check; the earlier rejection stays.
    let found = s
        .find_approved_row(&owner("u1"), &subject("Amoxicillin"))
        .unwrap()
        .unwrap();
    assert_eq!(found.status, AuthorizationStatus::Approved);
    assert_eq!(s.authorization_rows().len(), 2);
}

#[test]
fn at_authz_db_04_rows_by_owner_are_newest_first_and_owner_scoped() {
    let mut s = RxGateStore::new_in_memory();
    s.insert_authorization_row(row("u1", "A", AuthorizationStatus::Rejected, 10))
        .unwrap();
    s.insert_authorization_row(row("u1", "B", AuthorizationStatus::Approved, 30))
        .unwrap();
    s.insert_authorization_row(row("u2", "C", AuthorizationStatus::Approved, 20))
        .unwrap();

    let rows = s.authorization_rows_by_owner(&owner("u1")).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].subject_name, subject("B"));
    assert_eq!(rows[1].subject_name, subject("A"));
}

#[test]
fn at_authz_db_05_insert_rejects_contract_violations() {
    let mut s = RxGateStore::new_in_memory();
    let mut bad = row("u1", "A", AuthorizationStatus::Approved, 10);
    bad.schema_version = SchemaVersion(99);
    assert_ne!(bad.schema_version, AUTHZ_CONTRACT_VERSION);

    match s.insert_authorization_row(bad) {
        Err(StorageError::ContractViolation(_)) => {}
        other => panic!("expected contract violation, got {other:?}"),
    }
    assert!(s.authorization_rows().is_empty());
}

#[test]
fn at_authz_db_06_assigned_ids_are_resolvable_and_unique() {
    let mut s = RxGateStore::new_in_memory();
    let a = s
        .insert_authorization_row(row("u1", "A", AuthorizationStatus::Approved, 10))
        .unwrap();
    let b = s
        .insert_authorization_row(row("u1", "A", AuthorizationStatus::Approved, 10))
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(s.authorization_row(&a).unwrap().record_id, a);
    assert_eq!(s.authorization_row(&b).unwrap().record_id, b);
}
