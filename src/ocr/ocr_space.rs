//! OCR.space hosted OCR backend.
//!
//! Uploads the image as multipart/form-data to the parse endpoint.
//! Requires OCR_SPACE_API_KEY (or `remote.api_key` in the config file).
//!
//! Each call is made exactly once: timeouts, connection failures and
//! non-200 responses are reported as transient errors and left to the
//! fallback chain. The API exposes no confidence score, so a fixed
//! per-backend value from configuration is reported instead.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::backend::{BackendError, OcrBackend, OcrBackendType, Recognition};
use crate::config::RemoteOcrConfig;

/// OCR.space backend.
pub struct OcrSpaceBackend {
    client: Client,
    config: RemoteOcrConfig,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(rename = "OCRExitCode", default)]
    ocr_exit_code: Option<i64>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<ErrorMessage>,
    #[serde(default)]
    error_details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: Option<String>,
    #[serde(default)]
    error_message: Option<ErrorMessage>,
}

/// The API returns either a single string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    fn joined(&self) -> String {
        match self {
            ErrorMessage::One(s) => s.trim().to_string(),
            ErrorMessage::Many(v) => v
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

impl OcrSpaceResponse {
    /// First non-empty error message anywhere in the response.
    fn reported_error(&self) -> Option<String> {
        let from_results = self
            .parsed_results
            .iter()
            .flatten()
            .filter_map(|r| r.error_message.as_ref().map(ErrorMessage::joined));

        self.error_message
            .as_ref()
            .map(ErrorMessage::joined)
            .into_iter()
            .chain(self.error_details.clone())
            .chain(from_results)
            .find(|s| !s.is_empty())
    }

    fn error_text(&self) -> String {
        self.reported_error().unwrap_or_else(|| match self.ocr_exit_code {
            Some(code) => format!("OCR.space reported a processing error (exit code {})", code),
            None => "OCR.space reported a processing error".to_string(),
        })
    }

    fn text(&self) -> String {
        self.parsed_results
            .iter()
            .flatten()
            .filter_map(|r| r.parsed_text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OcrSpaceBackend {
    /// Create a new OCR.space backend.
    pub fn new(config: RemoteOcrConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BackendError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    fn build_form(&self, api_key: &str, image: &[u8]) -> Result<multipart::Form, BackendError> {
        let (mime, extension) = infer::get(image)
            .map(|kind| (kind.mime_type(), kind.extension()))
            .unwrap_or(("image/jpeg", "jpg"));

        let part = multipart::Part::bytes(image.to_vec())
            .file_name(format!("image.{}", extension))
            .mime_str(mime)
            .map_err(|e| BackendError::Logic(format!("Invalid MIME type: {}", e)))?;

        Ok(multipart::Form::new()
            .text("apikey", api_key.to_string())
            .text("language", self.config.language.clone())
            .text("isOverlayRequired", "false")
            .text("detectOrientation", "true")
            .text("scale", "true")
            .text("OCREngine", self.config.engine.to_string())
            .text("isTable", "false")
            .text("detectCheckbox", "false")
            .part("file", part))
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Transient(format!(
                "request timed out after {}s",
                self.timeout.as_secs_f32()
            ))
        } else if e.is_connect() {
            BackendError::Transient(format!("connection failed: {}", e))
        } else {
            BackendError::Transient(format!("request failed: {}", e))
        }
    }

    async fn call(&self, image: &[u8]) -> Result<String, BackendError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            BackendError::Unavailable(self.availability_hint())
        })?;

        let form = self.build_form(api_key, image)?;
        debug!("Sending {} bytes to {}", image.len(), self.config.endpoint);

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        debug!("OCR.space response status: {}", status);

        if status != StatusCode::OK {
            return Err(BackendError::Transient(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed: OcrSpaceResponse = serde_json::from_str(&body).map_err(|e| {
            BackendError::Logic(format!("Failed to parse OCR.space response: {}", e))
        })?;

        if parsed.is_errored_on_processing {
            return Err(BackendError::Logic(parsed.error_text()));
        }

        let text = parsed.text();
        if text.is_empty() {
            return Err(BackendError::Logic(match parsed.reported_error() {
                Some(reason) => format!("OCR.space returned no text: {}", reason),
                None => "OCR.space returned no text".to_string(),
            }));
        }
        Ok(text)
    }
}

#[async_trait]
impl OcrBackend for OcrSpaceBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::OcrSpace
    }

    fn language(&self) -> &str {
        &self.config.language
    }

    async fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.config.api_key.is_some() {
            format!("OCR.space configured ({})", self.config.endpoint)
        } else {
            "OCR_SPACE_API_KEY not set. Get an API key from https://ocr.space/ocrapi".to_string()
        }
    }

    async fn recognize(&self, image: &[u8]) -> Result<Recognition, BackendError> {
        let text = self.call(image).await?;
        Ok(Recognition::new(text, self.config.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, timeout: Duration) -> OcrSpaceBackend {
        let config = RemoteOcrConfig {
            endpoint: format!("{}/parse/image", server.uri()),
            api_key: Some("test-key".to_string()),
            ..RemoteOcrConfig::default()
        };
        OcrSpaceBackend::new(config, timeout).unwrap()
    }

    async fn respond_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parse/image"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_success_trims_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parse/image"))
            .and(body_string_contains("test-key"))
            .and(body_string_contains("detectOrientation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ParsedResults": [{"ParsedText": "  HELLO WORLD \r\n", "ErrorMessage": ""}],
                "OCRExitCode": 1,
                "IsErroredOnProcessing": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server, Duration::from_secs(5))
            .recognize(b"fake image bytes")
            .await
            .unwrap();
        assert_eq!(result.text, "HELLO WORLD");
        assert_eq!(result.confidence, 0.85);
    }

    #[tokio::test]
    async fn test_api_error_is_logic() {
        let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ParsedResults": null,
            "OCRExitCode": 99,
            "IsErroredOnProcessing": true,
            "ErrorMessage": ["Unable to recognize the file type", "E216"]
        })))
        .await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Logic("Unable to recognize the file type; E216".to_string())
        );
    }

    #[tokio::test]
    async fn test_string_error_message() {
        let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "IsErroredOnProcessing": true,
            "ErrorMessage": "File failed validation"
        })))
        .await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Logic("File failed validation".to_string()));
    }

    #[tokio::test]
    async fn test_blank_text_is_logic() {
        let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ParsedResults": [{"ParsedText": "   "}],
            "IsErroredOnProcessing": false
        })))
        .await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Logic(_)));
    }

    #[tokio::test]
    async fn test_blank_text_keeps_result_error() {
        let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ParsedResults": [{"ParsedText": "", "ErrorMessage": "Page 1: image is too small"}],
            "OCRExitCode": 3,
            "IsErroredOnProcessing": false
        })))
        .await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Logic("OCR.space returned no text: Page 1: image is too small".to_string())
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_logic() {
        let server = respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Logic(msg) if msg.contains("parse")));
    }

    #[tokio::test]
    async fn test_http_error_is_transient() {
        let server = respond_with(ResponseTemplate::new(503)).await;

        let err = backend(&server, Duration::from_secs(5))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Transient("HTTP 503".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"ParsedResults": [{"ParsedText": "late"}]})),
        )
        .await;

        let err = backend(&server, Duration::from_millis(200))
            .recognize(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transient(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let server = MockServer::start().await;
        let config = RemoteOcrConfig {
            endpoint: format!("{}/parse/image", server.uri()),
            api_key: None,
            ..RemoteOcrConfig::default()
        };
        let backend = OcrSpaceBackend::new(config, Duration::from_secs(1)).unwrap();

        assert!(!backend.is_available().await);
        let err = backend.recognize(b"img").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_multiple_results_joined() {
        let response: OcrSpaceResponse = serde_json::from_value(json!({
            "ParsedResults": [{"ParsedText": "page one "}, {"ParsedText": ""}, {"ParsedText": " page two"}]
        }))
        .unwrap();
        assert_eq!(response.text(), "page one\npage two");
    }
}
