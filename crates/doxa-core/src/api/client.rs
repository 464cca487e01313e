//! API client for the DOXA platform.
//!
//! This module provides the `ApiClient` struct, which implements the OAuth
//! transport used by login and refresh, the authenticated user lookup, and
//! the upload-slot and archive upload requests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::types::UserEnvelope;
use super::{ApiError, DeviceCodeResponse, SlotRequest, TokenReply, UploadSlot, UserInfo};
use crate::auth::AuthTransport;
use crate::config::{Config, CLIENT_ID, SCOPE};
use crate::upload::{parse_slot_response, parse_upload_response, ProgressSink, UploadTransport};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds for API calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connect timeout for archive uploads. The transfer itself is unbounded
/// since archives can be large.
const UPLOAD_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Multipart field carrying the archive
const ARCHIVE_FIELD: &str = "file";

/// File name reported for the archive part
const ARCHIVE_FILE_NAME: &str = "agent.tar.gz";

/// API client for the DOXA platform.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    upload_client: Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let upload_client = Client::builder()
            .connect_timeout(Duration::from_secs(UPLOAD_CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            upload_client,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenReply, ApiError> {
        let response = self
            .client
            .post(self.config.token_url())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, "Token endpoint replied");

        match TokenReply::parse(&body) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(ApiError::from_status(status, &body)),
            Err(e) => Err(e),
        }
    }

    /// Fetch the profile of the logged-in user.
    pub async fn fetch_user(&self, access_token: &str) -> Result<UserInfo, ApiError> {
        let response = self
            .client
            .post(self.config.user_url())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let envelope: UserEnvelope = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("user response: {}", e)))?;
        Ok(envelope.user)
    }
}

#[async_trait]
impl AuthTransport for ApiClient {
    async fn request_device_code(&self) -> Result<DeviceCodeResponse, ApiError> {
        let response = self
            .client
            .post(self.config.device_code_url())
            .form(&[("client_id", CLIENT_ID), ("scope", SCOPE)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("device code response: {}", e)))
    }

    async fn poll_device_token(&self, device_code: &str) -> Result<TokenReply, ApiError> {
        self.post_token_form(&[
            ("grant_type", "device_code"),
            ("client_id", CLIENT_ID),
            ("device_code", device_code),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenReply, ApiError> {
        self.post_token_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn request_slot(
        &self,
        access_token: &str,
        request: &SlotRequest<'_>,
    ) -> Result<UploadSlot, ApiError> {
        let response = self
            .client
            .post(self.config.upload_slot_url())
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, "Upload slot endpoint replied");
        parse_slot_response(status, &body)
    }

    async fn upload(
        &self,
        slot: &UploadSlot,
        archive: &Path,
        size: u64,
        progress: ProgressSink,
    ) -> Result<(), ApiError> {
        let file = tokio::fs::File::open(archive).await?;

        let sink = progress.clone();
        let mut transmitted = 0u64;
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            transmitted += chunk.len() as u64;
            sink(transmitted);
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), size)
            .file_name(ARCHIVE_FILE_NAME)
            .mime_str("application/gzip")?;
        let form = Form::new().part(ARCHIVE_FIELD, part);

        let response = self
            .upload_client
            .post(&slot.endpoint)
            .bearer_auth(&slot.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_upload_response(status, &body)?;

        progress(size);
        info!(size, "Archive uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    #[test]
    fn test_client_keeps_config() {
        let config = Config::new("https://example.test", "/tmp/doxa");
        let client = ApiClient::new(config.clone()).unwrap();
        assert_eq!(client.config(), &config);
    }

    fn json_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Accept one connection, capture the full request, then reply.
    async fn serve_once(response: String) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/upload", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (url, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        while !request_complete(&request) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        request
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(header_end) = find(request, b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let body_len = request.len() - (header_end + 4);

        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());
        match content_length {
            Some(len) => body_len >= len,
            None => request.ends_with(b"0\r\n\r\n"),
        }
    }

    fn archive(tmp: &TempDir) -> (std::path::PathBuf, u64) {
        let path = tmp.path().join("agent.tar.gz");
        let mut contents = b"ARCHIVE-START".to_vec();
        contents.extend(std::iter::repeat(b'x').take(100_000));
        std::fs::write(&path, &contents).unwrap();
        (path, contents.len() as u64)
    }

    fn slot(endpoint: String) -> UploadSlot {
        UploadSlot {
            endpoint,
            token: "slot-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upload_streams_archive_with_slot_token() {
        let tmp = TempDir::new().unwrap();
        let (path, size) = archive(&tmp);
        let (url, server) = serve_once(json_response("200 OK", r#"{"success": true}"#)).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let progress: ProgressSink = Arc::new(move |sent: u64| recorder.lock().unwrap().push(sent));

        let client = ApiClient::new(Config::new("http://unused.test", tmp.path())).unwrap();
        client.upload(&slot(url), &path, size, progress).await.unwrap();

        let request = server.await.unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /upload "));
        assert!(text.to_ascii_lowercase().contains("authorization: bearer slot-token"));
        assert!(text.contains("name=\"file\""));
        assert!(text.contains("filename=\"agent.tar.gz\""));
        assert!(text.contains("application/gzip"));
        assert!(find(&request, b"ARCHIVE-START").is_some());

        let seen = seen.lock().unwrap().clone();
        assert!(seen.len() > 2, "expected per-chunk progress, got {:?}", seen);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen[0] < size);
        assert_eq!(seen.last(), Some(&size));
    }

    #[tokio::test]
    async fn test_upload_rejection_is_classified() {
        let tmp = TempDir::new().unwrap();
        let (path, size) = archive(&tmp);
        let (url, server) = serve_once(json_response(
            "413 Payload Too Large",
            r#"{"success": false, "error": {"code": "TOO_LARGE", "message": "Archive exceeds the limit"}}"#,
        ))
        .await;

        let client = ApiClient::new(Config::new("http://unused.test", tmp.path())).unwrap();
        let err = client
            .upload(&slot(url), &path, size, Arc::new(|_: u64| {}))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, ApiError::Upload { ref code, .. } if code == "TOO_LARGE"));
    }
}
