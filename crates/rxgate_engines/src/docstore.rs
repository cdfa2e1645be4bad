#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use rxgate_kernel_contracts::authz::{DocumentRef, OwnerId};
use rxgate_kernel_contracts::docextract::DocumentPayload;
use rxgate_kernel_contracts::docstore::{
    DocUploadOk, DocUploadRefuse, DocUploadRequest, DocUploadResponse, DocumentObjectName,
    StoredDocumentRef,
};
use rxgate_kernel_contracts::{ContractViolation, MonotonicTimeNs, ReasonCodeId, Validate};
use sha2::{Digest, Sha256};

pub mod reason_codes {
    use rxgate_kernel_contracts::ReasonCodeId;

    // DOC_STORE reason-code namespace.
    pub const STORE_OK_UPLOAD: ReasonCodeId = ReasonCodeId(0x4453_0001);

    pub const STORE_FAIL_INPUT_SCHEMA_INVALID: ReasonCodeId = ReasonCodeId(0x4453_00F1);
    pub const STORE_FAIL_PROVIDER_MISSING_CONFIG: ReasonCodeId = ReasonCodeId(0x4453_00F2);
    pub const STORE_FAIL_PROVIDER_UPSTREAM: ReasonCodeId = ReasonCodeId(0x4453_00F3);
    pub const STORE_FAIL_REF_INVALID: ReasonCodeId = ReasonCodeId(0x4453_00F4);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocStoreConfig {
    pub timeout_ms: u32,
}

impl DocStoreConfig {
    pub fn mvp_v1() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocStoreProviderConfig {
    pub upload_url: String,
    pub public_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    /// When set, short-circuits the outbound call with this HTTP status.
    pub upload_fixture_status: Option<u16>,
}

impl DocStoreProviderConfig {
    pub fn from_env() -> Self {
        Self {
            upload_url: env::var("RXGATE_DOCSTORE_UPLOAD_URL").unwrap_or_else(|_| {
                "https://docstore.rxgate.local/object/prescriptions".to_string()
            }),
            public_url: env::var("RXGATE_DOCSTORE_PUBLIC_URL").unwrap_or_else(|_| {
                "https://docstore.rxgate.local/public/prescriptions".to_string()
            }),
            api_key: env::var("RXGATE_DOCSTORE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            user_agent: env::var("RXGATE_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "rxgate-docstore/1.0".to_string()),
            upload_fixture_status: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocStoreRuntime {
    config: DocStoreConfig,
    provider_config: DocStoreProviderConfig,
}

impl DocStoreRuntime {
    pub fn new(config: DocStoreConfig) -> Self {
        Self::new_with_provider_config(config, DocStoreProviderConfig::from_env())
    }

    pub fn new_with_provider_config(
        config: DocStoreConfig,
        provider_config: DocStoreProviderConfig,
    ) -> Self {
        Self {
            config,
            provider_config,
        }
    }

    pub fn run(&self, req: &DocUploadRequest) -> DocUploadResponse {
        if req.validate().is_err() {
            return refuse(
                reason_codes::STORE_FAIL_INPUT_SCHEMA_INVALID,
                "upload request failed contract validation".to_string(),
            );
        }

        if let Err(r) = self.push_object(req) {
            return DocUploadResponse::Refuse(r);
        }

        let raw_ref = format!(
            "{}/{}",
            self.provider_config.public_url.trim_end_matches('/'),
            req.object_name.as_str()
        );
        let document_ref = match DocumentRef::new(raw_ref) {
            Ok(r) => r,
            Err(_) => {
                return refuse(
                    reason_codes::STORE_FAIL_REF_INVALID,
                    "provider public url does not form a valid document ref".to_string(),
                )
            }
        };

        let stored = match StoredDocumentRef::v1(
            document_ref,
            req.object_name.clone(),
            sha256_hex(&req.document.bytes),
        ) {
            Ok(s) => s,
            Err(_) => {
                return refuse(
                    reason_codes::STORE_FAIL_REF_INVALID,
                    "failed to construct stored document ref".to_string(),
                )
            }
        };

        match DocUploadOk::v1(reason_codes::STORE_OK_UPLOAD, stored) {
            Ok(ok) => DocUploadResponse::Ok(ok),
            Err(_) => refuse(
                reason_codes::STORE_FAIL_REF_INVALID,
                "failed to construct upload output".to_string(),
            ),
        }
    }

    fn push_object(&self, req: &DocUploadRequest) -> Result<(), DocUploadRefuse> {
        if let Some(status) = self.provider_config.upload_fixture_status {
            if (200..300).contains(&status) {
                return Ok(());
            }
            return Err(refuse_inner(
                reason_codes::STORE_FAIL_PROVIDER_UPSTREAM,
                format!("provider=docstore error=http_non_200 status={status}"),
            ));
        }

        let api_key = match self.provider_config.api_key.as_deref() {
            Some(key) => key,
            None => {
                return Err(refuse_inner(
                    reason_codes::STORE_FAIL_PROVIDER_MISSING_CONFIG,
                    "docstore provider api key is not configured".to_string(),
                ))
            }
        };

        let agent = build_http_agent(self.config.timeout_ms, &self.provider_config.user_agent)
            .map_err(|_| {
                refuse_inner(
                    reason_codes::STORE_FAIL_PROVIDER_MISSING_CONFIG,
                    "docstore http agent configuration is invalid".to_string(),
                )
            })?;

        let endpoint = format!(
            "{}/{}",
            self.provider_config.upload_url.trim_end_matches('/'),
            req.object_name.as_str()
        );
        agent
            .post(&endpoint)
            .set("Content-Type", req.document.kind.content_type())
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_bytes(&req.document.bytes)
            .map_err(|e| {
                refuse_inner(
                    reason_codes::STORE_FAIL_PROVIDER_UPSTREAM,
                    upload_error_detail(e),
                )
            })?;
        Ok(())
    }
}

/// Deterministic caller-chosen object name:
/// `verification_<owner>_<now-ns>_<content-hash-prefix>.<ext>`.
pub fn object_name_for(
    owner: &OwnerId,
    now: MonotonicTimeNs,
    document: &DocumentPayload,
) -> Result<DocumentObjectName, ContractViolation> {
    let digest = sha256_hex(&document.bytes);
    DocumentObjectName::new(format!(
        "verification_{}_{}_{}.{}",
        owner.as_str(),
        now.0,
        &digest[..16],
        document.kind.as_str()
    ))
}

/// Plain uploads submitted for later review carry no `verification_` prefix.
pub fn upload_object_name_for(
    owner: &OwnerId,
    now: MonotonicTimeNs,
    document: &DocumentPayload,
) -> Result<DocumentObjectName, ContractViolation> {
    let digest = sha256_hex(&document.bytes);
    DocumentObjectName::new(format!(
        "{}_{}_{}.{}",
        owner.as_str(),
        now.0,
        &digest[..16],
        document.kind.as_str()
    ))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn refuse(reason_code: ReasonCodeId, message: String) -> DocUploadResponse {
    DocUploadResponse::Refuse(refuse_inner(reason_code, message))
}

fn refuse_inner(reason_code: ReasonCodeId, message: String) -> DocUploadRefuse {
    DocUploadRefuse::v1(reason_code, message)
        .expect("DocUploadRefuse::v1 must construct for bounded message")
}

fn upload_error_detail(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(status, _) => {
            format!("provider=docstore error=http_non_200 status={status}")
        }
        ureq::Error::Transport(_) => "provider=docstore error=transport".to_string(),
    }
}

fn build_http_agent(timeout_ms: u32, user_agent: &str) -> Result<ureq::Agent, String> {
    if timeout_ms == 0 {
        return Err("timeout must be > 0".to_string());
    }
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    Ok(ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxgate_kernel_contracts::audit::CorrelationId;
    use rxgate_kernel_contracts::docextract::DocumentKind;

    fn runtime_with_fixture(status: Option<u16>) -> DocStoreRuntime {
        DocStoreRuntime::new_with_provider_config(
            DocStoreConfig::mvp_v1(),
            DocStoreProviderConfig {
                upload_url: "https://docstore.rxgate.local/object/prescriptions".to_string(),
                public_url: "https://docstore.rxgate.local/public/prescriptions".to_string(),
                api_key: None,
                user_agent: "rxgate-docstore/test".to_string(),
                upload_fixture_status: status,
            },
        )
    }

    fn request() -> DocUploadRequest {
        DocUploadRequest::v1(
            CorrelationId(3),
            DocumentObjectName::new("verification_user_1_42_ab12cd34.png").unwrap(),
            DocumentPayload::v1(DocumentKind::Png, vec![9, 9, 9]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn fixture_success_returns_public_ref_and_digest() {
        let runtime = runtime_with_fixture(Some(200));
        match runtime.run(&request()) {
            DocUploadResponse::Ok(ok) => {
                assert_eq!(ok.reason_code, reason_codes::STORE_OK_UPLOAD);
                assert_eq!(
                    ok.stored.document_ref.as_str(),
                    "https://docstore.rxgate.local/public/prescriptions/verification_user_1_42_ab12cd34.png"
                );
                assert_eq!(ok.stored.content_sha256_hex, sha256_hex(&[9, 9, 9]));
            }
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn fixture_server_error_is_upstream_failure() {
        let runtime = runtime_with_fixture(Some(503));
        match runtime.run(&request()) {
            DocUploadResponse::Refuse(r) => {
                assert_eq!(r.reason_code, reason_codes::STORE_FAIL_PROVIDER_UPSTREAM);
                assert!(r.message.contains("status=503"));
            }
            other => panic!("expected refuse, got {other:?}"),
        }
    }

    #[test]
    fn missing_api_key_refuses_without_network() {
        let runtime = runtime_with_fixture(None);
        match runtime.run(&request()) {
            DocUploadResponse::Refuse(r) => {
                assert_eq!(r.reason_code, reason_codes::STORE_FAIL_PROVIDER_MISSING_CONFIG);
            }
            other => panic!("expected refuse, got {other:?}"),
        }
    }

    #[test]
    fn object_name_is_deterministic_per_owner_time_and_content() {
        let owner = OwnerId::new("user_1").unwrap();
        let doc = DocumentPayload::v1(DocumentKind::Jpeg, vec![1, 2, 3]).unwrap();
        let a = object_name_for(&owner, MonotonicTimeNs(42), &doc).unwrap();
        let b = object_name_for(&owner, MonotonicTimeNs(42), &doc).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("verification_user_1_42_"));
        assert!(a.as_str().ends_with(".jpeg"));
    }
}
