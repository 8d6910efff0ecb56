use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Failure of a remote model call, reduced to the two categories the
/// provider actually distinguishes in practice: quota exhaustion and
/// everything else.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn is_quota(&self) -> bool {
        matches!(self, RemoteError::Quota(_))
    }
}

/// Text-only generation: one prompt in, free text out.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, RemoteError>;
}

/// Multimodal generation over an instruction plus an audio payload.
///
/// Implementations own the upload-by-reference dance: the audio is
/// staged with the provider for the duration of the call and removed
/// again before this returns, on success and on failure.
#[async_trait]
pub trait MultimodalModel: Send + Sync {
    async fn analyze_audio(
        &self,
        instruction: &str,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<String, RemoteError>;
}

// Request/response wire types for the generateContent endpoint

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "file_data", skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            file_data: None,
        }
    }

    fn file(file: &RemoteFile) -> Self {
        Part {
            text: None,
            file_data: Some(FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            }),
        }
    }
}

#[derive(Serialize)]
struct FileData {
    #[serde(rename = "mime_type")]
    mime_type: String,
    #[serde(rename = "file_uri")]
    file_uri: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Handle to an audio payload staged through the Files API.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    name: String,
    uri: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

/// REST client for the Gemini v1beta API.
///
/// Built once at startup and shared between the question generator and
/// the answer analyzer.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(std::time::Duration::from_secs(5))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: BASE_URL.to_string(),
            model: settings.model.clone(),
        }
    }

    /// Point the client at a different endpoint (proxies, stub servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate_content(&self, parts: Vec<Part>) -> Result<String, RemoteError> {
        let request = GenerateRequest {
            contents: vec![RequestContent { parts }],
        };

        debug!("Sending generateContent request to model {}", self.model);

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Gemini API error ({}): {}", status, body);
            return Err(classify_failure(status, &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Other(format!("Failed to parse Gemini response: {}", e)))?;

        extract_text(parsed)
    }

    /// Stage raw audio bytes with the Files API so generateContent can
    /// reference them by URI.
    async fn upload_file(&self, bytes: &[u8], mime_type: &str) -> Result<RemoteFile, RemoteError> {
        info!("Uploading {} byte audio payload to Files API", bytes.len());

        let response = self
            .client
            .post(format!(
                "{}/upload/v1beta/files?key={}",
                self.base_url, self.api_key
            ))
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("File upload failed ({}): {}", status, body);
            return Err(classify_failure(status, &body));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Other(format!("Failed to parse upload response: {}", e)))?;

        debug!("Staged audio as {}", uploaded.file.name);

        Ok(RemoteFile {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }

    /// Remove a staged file. Best effort: a failed delete is logged but
    /// never changes the outcome of the analysis that staged it.
    async fn delete_file(&self, name: &str) {
        let result = self
            .client
            .delete(format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Deleted staged file {}", name);
            }
            Ok(response) => {
                warn!("Failed to delete staged file {}: HTTP {}", name, response.status());
            }
            Err(e) => {
                warn!("Failed to delete staged file {}: {}", name, e);
            }
        }
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, RemoteError> {
        self.generate_content(vec![Part::text(prompt)]).await
    }
}

#[async_trait]
impl MultimodalModel for GeminiClient {
    async fn analyze_audio(
        &self,
        instruction: &str,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<String, RemoteError> {
        let staged = self.upload_file(audio, mime_type).await?;

        // The staged file lives exactly as long as this call: delete it
        // whether generation succeeded or not.
        let result = self
            .generate_content(vec![Part::text(instruction), Part::file(&staged)])
            .await;

        self.delete_file(&staged.name).await;

        result
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Other(format!("Request timed out: {}", e))
    } else {
        RemoteError::Other(format!("Request failed: {}", e))
    }
}

/// Classify a non-2xx response. HTTP 429 and the RESOURCE_EXHAUSTED
/// status in the error payload are the provider's quota signals; every
/// other failure folds into the generic category.
fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    let provider_status = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["status"].as_str().map(str::to_string));

    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status));

    let is_quota = status == StatusCode::TOO_MANY_REQUESTS
        || provider_status.as_deref() == Some("RESOURCE_EXHAUSTED");

    if is_quota {
        RemoteError::Quota(message)
    } else {
        RemoteError::Other(message)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, RemoteError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(RemoteError::Other(
            "No candidates in Gemini response".to_string(),
        ))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_is_quota() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_quota());
    }

    #[test]
    fn test_resource_exhausted_status_is_quota() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded for quota metric","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body);
        assert!(err.is_quota());
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[test]
    fn test_server_error_is_other() {
        let body = r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#;
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert!(!err.is_quota());
        assert_eq!(err.to_string(), "Internal error");
    }

    #[test]
    fn test_unparsable_error_body_is_other_with_status() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(!err.is_quota());
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hola "},{"text":"mundo"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hola mundo");
    }

    #[test]
    fn test_extract_text_empty_candidates_is_error() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn test_upload_response_parses() {
        let parsed: UploadResponse = serde_json::from_str(
            r#"{"file":{"name":"files/abc123","uri":"https://generativelanguage.googleapis.com/v1beta/files/abc123","mimeType":"audio/wav"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.file.name, "files/abc123");
        assert_eq!(parsed.file.mime_type.as_deref(), Some("audio/wav"));
    }

    #[test]
    fn test_request_part_serialization_omits_empty_fields() {
        let json = serde_json::to_value(Part::text("hola")).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hola"}));
    }

    // Staging lifecycle tests against a stub HTTP endpoint: the staged
    // file must be deleted after generateContent, whether it succeeded
    // or not.

    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const UPLOAD_OK: &str = r#"{"file":{"name":"files/stub-audio","uri":"http://stub/v1beta/files/stub-audio","mimeType":"audio/wav"}}"#;
    const GENERATE_OK: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"{\"ok\":true}"}]}}]}"#;
    const GENERATE_FAIL: &str =
        r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#;

    fn test_settings() -> Settings {
        Settings {
            api_key: "test-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: std::time::Duration::from_secs(5),
        }
    }

    /// Serve one canned response per incoming request, logging each
    /// request line in order.
    async fn spawn_stub_api(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let request_log = log.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request_line = read_request(&mut stream).await;
                request_log.lock().push(request_line);

                let response = format!(
                    "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), log)
    }

    /// Read a full request (headers plus declared body) and return its
    /// request line.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = headers
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);

            while buf.len() < header_end + 4 + content_length {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            return headers.lines().next().unwrap_or_default().to_string();
        }

        String::new()
    }

    #[tokio::test]
    async fn test_staged_file_deleted_after_successful_generate() {
        let (base_url, log) = spawn_stub_api(vec![
            (200, UPLOAD_OK),
            (200, GENERATE_OK),
            (200, "{}"),
        ])
        .await;
        let client = GeminiClient::new(&test_settings()).with_base_url(base_url);

        let result = client
            .analyze_audio("instruction", b"wav-bytes", "audio/wav")
            .await;
        assert!(result.is_ok());

        let requests = log.lock().clone();
        assert_eq!(requests.len(), 3, "unexpected requests: {:?}", requests);
        assert!(requests[0].starts_with("POST /upload/v1beta/files"));
        assert!(requests[1].contains(":generateContent"));
        assert!(
            requests[2].starts_with("DELETE /v1beta/files/stub-audio"),
            "staged file was not deleted: {:?}",
            requests
        );
    }

    #[tokio::test]
    async fn test_staged_file_deleted_after_failed_generate() {
        let (base_url, log) = spawn_stub_api(vec![
            (200, UPLOAD_OK),
            (500, GENERATE_FAIL),
            (200, "{}"),
        ])
        .await;
        let client = GeminiClient::new(&test_settings()).with_base_url(base_url);

        let result = client
            .analyze_audio("instruction", b"wav-bytes", "audio/wav")
            .await;
        assert!(matches!(result, Err(RemoteError::Other(_))));

        let requests = log.lock().clone();
        assert_eq!(requests.len(), 3, "unexpected requests: {:?}", requests);
        assert!(
            requests[2].starts_with("DELETE /v1beta/files/stub-audio"),
            "staged file was not deleted after failure: {:?}",
            requests
        );
    }

    #[tokio::test]
    async fn test_failed_upload_stages_nothing_and_skips_generate() {
        let (base_url, log) =
            spawn_stub_api(vec![(503, r#"{"error":{"message":"unavailable"}}"#)]).await;
        let client = GeminiClient::new(&test_settings()).with_base_url(base_url);

        let result = client
            .analyze_audio("instruction", b"wav-bytes", "audio/wav")
            .await;
        assert!(result.is_err());

        let requests = log.lock().clone();
        assert_eq!(requests.len(), 1, "unexpected requests: {:?}", requests);
        assert!(requests[0].starts_with("POST /upload/v1beta/files"));
    }
}
