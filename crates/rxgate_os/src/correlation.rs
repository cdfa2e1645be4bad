#![forbid(unsafe_code)]

use rxgate_kernel_contracts::audit::CorrelationId;
use rxgate_kernel_contracts::authz::{OwnerId, SubjectName};
use rxgate_kernel_contracts::MonotonicTimeNs;
use sha2::{Digest, Sha256};

/// Deterministic correlation id tying together the audit rows of one
/// evaluator/pipeline invocation.
pub(crate) fn correlation_id_for(
    owner: Option<&OwnerId>,
    subject_name: &SubjectName,
    now: MonotonicTimeNs,
) -> CorrelationId {
    let mut hasher = Sha256::new();
    hasher.update(owner.map(OwnerId::as_str).unwrap_or("anonymous").as_bytes());
    hasher.update([0x1f]);
    hasher.update(subject_name.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(now.0.to_be_bytes());
    let digest = hasher.finalize();
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    let id = u64::from_be_bytes(raw);
    // CorrelationId must be nonzero.
    CorrelationId(id.max(1))
}
