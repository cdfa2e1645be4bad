#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use base64::Engine as _;
use rxgate_kernel_contracts::docextract::{
    DocExtractOk, DocExtractRefuse, DocExtractRequest, DocExtractResponse, DocumentKind,
    ExtractedText, MAX_EXTRACTED_CHARS,
};
use rxgate_kernel_contracts::{ReasonCodeId, Validate};
use serde::{Deserialize, Serialize};

pub mod reason_codes {
    use rxgate_kernel_contracts::ReasonCodeId;

    // DOC_EXTRACT reason-code namespace.
    pub const EXTRACT_OK_TEXT: ReasonCodeId = ReasonCodeId(0x4F43_0001);

    pub const EXTRACT_FAIL_INPUT_SCHEMA_INVALID: ReasonCodeId = ReasonCodeId(0x4F43_00F1);
    pub const EXTRACT_FAIL_DOCUMENT_UNREADABLE: ReasonCodeId = ReasonCodeId(0x4F43_00F2);
    pub const EXTRACT_FAIL_PROVIDER_MISSING_CONFIG: ReasonCodeId = ReasonCodeId(0x4F43_00F3);
    pub const EXTRACT_FAIL_PROVIDER_UPSTREAM: ReasonCodeId = ReasonCodeId(0x4F43_00F4);
    pub const EXTRACT_FAIL_TEXT_EMPTY: ReasonCodeId = ReasonCodeId(0x4F43_00F5);
    pub const EXTRACT_FAIL_INTERNAL_PIPELINE_ERROR: ReasonCodeId = ReasonCodeId(0x4F43_00FF);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallError {
    provider: &'static str,
    http_status: Option<u16>,
    error_kind: &'static str,
}

impl ProviderCallError {
    fn new(provider: &'static str, error_kind: &'static str, http_status: Option<u16>) -> Self {
        Self {
            provider,
            http_status,
            error_kind,
        }
    }

    pub fn safe_detail(&self) -> String {
        match self.http_status {
            Some(status) => format!(
                "provider={} error={} status={}",
                self.provider, self.error_kind, status
            ),
            None => format!("provider={} error={}", self.provider, self.error_kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocExtractConfig {
    pub timeout_ms: u32,
    pub max_text_chars: usize,
}

impl DocExtractConfig {
    pub fn mvp_v1() -> Self {
        Self {
            timeout_ms: 20_000,
            max_text_chars: MAX_EXTRACTED_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocExtractProviderConfig {
    pub ocr_url: String,
    pub ocr_api_key: Option<String>,
    pub user_agent: String,
    pub ocr_fixture_json: Option<String>,
}

impl DocExtractProviderConfig {
    pub fn from_env() -> Self {
        Self {
            ocr_url: env::var("RXGATE_OCR_URL")
                .unwrap_or_else(|_| "https://ocr.rxgate.local/v1/recognize".to_string()),
            ocr_api_key: env::var("RXGATE_OCR_API_KEY").ok().filter(|k| !k.is_empty()),
            user_agent: env::var("RXGATE_HTTP_USER_AGENT")
                .unwrap_or_else(|_| "rxgate-docextract/1.0".to_string()),
            ocr_fixture_json: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocExtractRuntime {
    config: DocExtractConfig,
    provider_config: DocExtractProviderConfig,
}

impl DocExtractRuntime {
    pub fn new(config: DocExtractConfig) -> Self {
        Self::new_with_provider_config(config, DocExtractProviderConfig::from_env())
    }

    pub fn new_with_provider_config(
        config: DocExtractConfig,
        provider_config: DocExtractProviderConfig,
    ) -> Self {
        Self {
            config,
            provider_config,
        }
    }

    pub fn run(&self, req: &DocExtractRequest) -> DocExtractResponse {
        if req.validate().is_err() {
            return refuse(
                reason_codes::EXTRACT_FAIL_INPUT_SCHEMA_INVALID,
                "extract request failed contract validation".to_string(),
            );
        }

        let (raw_text, provider_hint) = match req.document.kind {
            DocumentKind::Pdf => match extract_pdf_text(&req.document.bytes) {
                Ok(text) => (text, Some("embedded-pdf-text".to_string())),
                Err(detail) => {
                    return refuse(reason_codes::EXTRACT_FAIL_DOCUMENT_UNREADABLE, detail)
                }
            },
            DocumentKind::Png | DocumentKind::Jpeg => {
                let api_key = match (
                    self.provider_config.ocr_fixture_json.as_deref(),
                    self.provider_config.ocr_api_key.as_deref(),
                ) {
                    (Some(_), _) => "",
                    (None, Some(key)) => key,
                    (None, None) => {
                        return refuse(
                            reason_codes::EXTRACT_FAIL_PROVIDER_MISSING_CONFIG,
                            "ocr provider api key is not configured".to_string(),
                        )
                    }
                };
                match run_ocr_provider(
                    &self.provider_config.ocr_url,
                    api_key,
                    &req.document.bytes,
                    req.document.kind,
                    req.language_hint.as_str(),
                    self.config.timeout_ms,
                    &self.provider_config.user_agent,
                    self.provider_config.ocr_fixture_json.as_deref(),
                ) {
                    Ok(text) => (text, Some("hosted-ocr".to_string())),
                    Err(err) => {
                        return refuse(reason_codes::EXTRACT_FAIL_PROVIDER_UPSTREAM, err.safe_detail())
                    }
                }
            }
        };

        let bounded = truncate_to_char_boundary(&raw_text, self.config.max_text_chars);
        let text = match ExtractedText::new(bounded) {
            Ok(text) => text,
            Err(_) => {
                return refuse(
                    reason_codes::EXTRACT_FAIL_TEXT_EMPTY,
                    "no recognizable text in document".to_string(),
                )
            }
        };

        match DocExtractOk::v1(reason_codes::EXTRACT_OK_TEXT, text, provider_hint) {
            Ok(ok) => DocExtractResponse::Ok(ok),
            Err(_) => refuse(
                reason_codes::EXTRACT_FAIL_INTERNAL_PIPELINE_ERROR,
                "failed to construct extract output".to_string(),
            ),
        }
    }
}

fn refuse(reason_code: ReasonCodeId, message: String) -> DocExtractResponse {
    let r = DocExtractRefuse::v1(reason_code, message)
        .expect("DocExtractRefuse::v1 must construct for bounded message");
    DocExtractResponse::Refuse(r)
}

/// Text-bearing PDFs skip the OCR provider entirely: the embedded content
/// stream is authoritative for what the document says.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|_| "document is not a readable pdf".to_string())?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err("pdf has no pages".to_string());
    }
    doc.extract_text(&pages)
        .map_err(|_| "pdf carries no extractable text".to_string())
}

#[derive(Debug, Serialize)]
struct OcrWireRequest {
    image_b64: String,
    content_type: &'static str,
    language: String,
}

#[derive(Debug, Deserialize)]
struct OcrWireResponse {
    text: Option<String>,
}

#[allow(clippy::too_many_arguments)]
fn run_ocr_provider(
    endpoint: &str,
    api_key: &str,
    bytes: &[u8],
    kind: DocumentKind,
    language: &str,
    timeout_ms: u32,
    user_agent: &str,
    fixture_json: Option<&str>,
) -> Result<String, ProviderCallError> {
    let body: OcrWireResponse = if let Some(fixture) = fixture_json {
        serde_json::from_str(fixture).map_err(|_| ProviderCallError::new("ocr", "json_parse", None))?
    } else {
        let payload = OcrWireRequest {
            image_b64: base64::engine::general_purpose::STANDARD.encode(bytes),
            content_type: kind.content_type(),
            language: language.to_string(),
        };
        let agent = build_http_agent(timeout_ms, user_agent)
            .map_err(|_| ProviderCallError::new("ocr", "config_invalid", None))?;
        let response = agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Accept", "application/json")
            .send_json(&payload)
            .map_err(|e| provider_error_from_ureq("ocr", e))?;
        serde_json::from_reader(response.into_reader())
            .map_err(|_| ProviderCallError::new("ocr", "json_parse", None))?
    };

    body.text
        .ok_or_else(|| ProviderCallError::new("ocr", "missing_text_field", None))
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

fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderCallError {
    match err {
        ureq::Error::Status(status, _) => {
            ProviderCallError::new(provider, "http_non_200", Some(status))
        }
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            ProviderCallError::new(provider, classify_transport_error_kind(&combined), None)
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

fn truncate_to_char_boundary(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>()
}
