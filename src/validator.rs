use std::time::Instant;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ValidatorSettings;
use crate::error::ShellError;

/// Payload submitted to the compliance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRequest {
    pub raw_url: String,
    pub https_required: bool,
    pub params: String,
}

impl ValidationRequest {
    pub fn new(raw_url: impl Into<String>, https_required: bool, params: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            https_required,
            params: params.into(),
        }
    }

    /// Form fields in the order the endpoint expects. `perameter` is the
    /// endpoint's spelling.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("url", self.raw_url.clone()),
            (
                "https",
                if self.https_required { "true" } else { "false" }.to_string(),
            ),
            ("perameter", self.params.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Error,
}

/// Interpreted response from the compliance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub canonical_url: String,
    pub https_supported: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawValidationResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    valid_url: Option<String>,
    #[serde(default)]
    https: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl ValidationResult {
    pub fn from_json(value: Value) -> Result<Self> {
        if !value.is_object() {
            bail!("validation endpoint returned a non-object payload");
        }
        let raw: RawValidationResponse = serde_json::from_value(value)
            .context("Malformed response from validation endpoint")?;
        let status = match raw.status.as_deref() {
            Some("error") => ValidationStatus::Error,
            _ => ValidationStatus::Ok,
        };
        Ok(Self {
            status,
            canonical_url: raw.valid_url.unwrap_or_default(),
            https_supported: raw.https.unwrap_or(false),
            error_message: raw.error,
        })
    }

    /// Apply the acceptance rule, yielding the canonical URL to navigate to.
    pub fn verdict(&self, https_required: bool) -> Result<String, ShellError> {
        if self.status == ValidationStatus::Error {
            return Err(ShellError::rejected(self.error_message.as_deref()));
        }
        if self.canonical_url.trim().is_empty() {
            return Err(ShellError::rejected(None));
        }
        if !accepts(https_required, self.https_supported) {
            return Err(ShellError::PolicyRejected);
        }
        Ok(self.canonical_url.clone())
    }
}

/// HTTPS acceptance rule: either HTTPS is optional, or the site supports it.
pub fn accepts(https_required: bool, https_supported: bool) -> bool {
    (https_required && https_supported) || !https_required
}

pub trait ValidationHttp {
    fn post_form(&self, url: &str, fields: &[(&'static str, String)]) -> Result<Value>;
}

pub struct BlockingValidationHttp {
    client: Client,
}

impl BlockingValidationHttp {
    pub fn from_settings(settings: &ValidatorSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()
            .context("failed to build validation HTTP client")?;
        Ok(Self { client })
    }
}

impl ValidationHttp for BlockingValidationHttp {
    fn post_form(&self, url: &str, fields: &[(&'static str, String)]) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .with_context(|| format!("Failed to reach validation endpoint {url}"))?;
        if !response.status().is_success() {
            bail!("validation endpoint {url} returned status {}", response.status());
        }
        response
            .json()
            .context("validation endpoint returned non-JSON payload")
    }
}

/// Client for the remote URL compliance check.
pub struct UrlValidator<H> {
    endpoint: String,
    http: H,
}

impl UrlValidator<BlockingValidationHttp> {
    pub fn from_settings(settings: &ValidatorSettings) -> Result<Self> {
        let http = BlockingValidationHttp::from_settings(settings)?;
        Ok(Self::new(settings.endpoint.clone(), http))
    }
}

impl<H: ValidationHttp> UrlValidator<H> {
    pub fn new(endpoint: impl Into<String>, http: H) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    /// Issue one validation request. Only transport-level failures are errors
    /// here; rejections are carried in the result.
    pub fn submit(&self, request: &ValidationRequest) -> Result<ValidationResult, ShellError> {
        let started = Instant::now();
        let fields = request.form_fields();
        let response = self
            .http
            .post_form(&self.endpoint, &fields)
            .and_then(ValidationResult::from_json)
            .map_err(ShellError::Network)?;
        debug!(
            url = %request.raw_url,
            status = ?response.status,
            https = response.https_supported,
            latency_ms = started.elapsed().as_millis() as u64,
            "validation endpoint replied"
        );
        Ok(response)
    }

    /// Submit and apply the acceptance rule in one step.
    pub fn validate(&self, request: &ValidationRequest) -> Result<String, ShellError> {
        let result = self.submit(request)?;
        let canonical = result.verdict(request.https_required)?;
        info!(url = %request.raw_url, canonical = %canonical, "URL accepted");
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Debug, Clone)]
    struct StubCall {
        url: String,
        fields: Vec<(&'static str, String)>,
    }

    struct StubValidationHttp {
        reply: RefCell<Option<Result<Value>>>,
        calls: RefCell<Vec<StubCall>>,
    }

    impl StubValidationHttp {
        fn replying(value: Value) -> Self {
            Self {
                reply: RefCell::new(Some(Ok(value))),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn failing(message: &'static str) -> Self {
            Self {
                reply: RefCell::new(Some(Err(anyhow::anyhow!(message)))),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ValidationHttp for StubValidationHttp {
        fn post_form(&self, url: &str, fields: &[(&'static str, String)]) -> Result<Value> {
            self.calls.borrow_mut().push(StubCall {
                url: url.to_string(),
                fields: fields.to_vec(),
            });
            self.reply
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no stub reply left")))
        }
    }

    const ENDPOINT: &str = "https://validator.test/valid-url";

    #[test]
    fn accept_rule_covers_every_combination() {
        assert!(accepts(false, false));
        assert!(accepts(false, true));
        assert!(accepts(true, true));
        assert!(!accepts(true, false));
    }

    #[test]
    fn submits_form_fields_with_endpoint_spelling() {
        let stub = StubValidationHttp::replying(json!({
            "status": "ok",
            "valid_url": "https://example.org/",
            "https": true
        }));
        let validator = UrlValidator::new(ENDPOINT, stub);
        let request = ValidationRequest::new("example.org", true, "?x=1");

        let canonical = validator.validate(&request).unwrap();
        assert_eq!(canonical, "https://example.org/");

        let calls = validator.http().calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, ENDPOINT);
        assert_eq!(
            calls[0].fields,
            vec![
                ("url", "example.org".to_string()),
                ("https", "true".to_string()),
                ("perameter", "?x=1".to_string()),
            ]
        );
    }

    #[test]
    fn server_error_status_is_a_validation_rejection() {
        let stub = StubValidationHttp::replying(json!({
            "status": "error",
            "error": "Domain does not resolve"
        }));
        let validator = UrlValidator::new(ENDPOINT, stub);
        let error = validator
            .validate(&ValidationRequest::new("nope", false, ""))
            .unwrap_err();
        match error {
            ShellError::ValidationRejected { message } => {
                assert_eq!(message, "Domain does not resolve")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_error_without_message_uses_default() {
        let stub = StubValidationHttp::replying(json!({"status": "error"}));
        let validator = UrlValidator::new(ENDPOINT, stub);
        let error = validator
            .validate(&ValidationRequest::new("nope", false, ""))
            .unwrap_err();
        assert_eq!(error.to_string(), "Invalid URL.");
    }

    #[test]
    fn missing_https_support_is_a_policy_rejection() {
        let stub = StubValidationHttp::replying(json!({
            "status": "ok",
            "valid_url": "http://plain.test/",
            "https": false
        }));
        let validator = UrlValidator::new(ENDPOINT, stub);
        let error = validator
            .validate(&ValidationRequest::new("plain.test", true, ""))
            .unwrap_err();
        assert!(matches!(error, ShellError::PolicyRejected));
    }

    #[test]
    fn https_optional_accepts_plain_sites() {
        let stub = StubValidationHttp::replying(json!({
            "status": "ok",
            "valid_url": "http://plain.test/",
            "https": false
        }));
        let validator = UrlValidator::new(ENDPOINT, stub);
        let canonical = validator
            .validate(&ValidationRequest::new("plain.test", false, ""))
            .unwrap();
        assert_eq!(canonical, "http://plain.test/");
    }

    #[test]
    fn transport_failure_is_a_network_error() {
        let validator = UrlValidator::new(ENDPOINT, StubValidationHttp::failing("dns failure"));
        let error = validator
            .submit(&ValidationRequest::new("example.org", false, ""))
            .unwrap_err();
        assert!(matches!(error, ShellError::Network(_)));
        assert!(error.to_string().contains("dns failure"));
    }

    #[test]
    fn non_object_payload_is_a_network_error() {
        let validator = UrlValidator::new(ENDPOINT, StubValidationHttp::replying(json!("<html>")));
        let error = validator
            .submit(&ValidationRequest::new("example.org", false, ""))
            .unwrap_err();
        assert!(matches!(error, ShellError::Network(_)));
    }

    #[test]
    fn accepted_status_without_url_is_rejected() {
        let result = ValidationResult::from_json(json!({"status": "ok", "https": true})).unwrap();
        let error = result.verdict(false).unwrap_err();
        assert!(matches!(error, ShellError::ValidationRejected { .. }));
    }
}
