//! Upload coordination.
//!
//! A submission is uploaded in three steps: the directory is packed into a
//! temporary archive, an upload slot is requested for its size, and the
//! archive is streamed to the slot's endpoint with the slot's one-time
//! token. Slots are single-use and nothing here is retried.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::api::types::RawSubmissionBody;
use crate::api::{ApiError, SlotRequest, UploadSlot, UNKNOWN_ERROR_CODE};
use crate::error::DoxaError;
use crate::submission::{
    pack_to_tempfile, ExclusionRules, PackStats, PackagingError, PackedArchive, PreparedSubmission,
};

/// Receives the cumulative number of archive bytes sent so far.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Submission endpoints: slot negotiation and the archive upload itself.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn request_slot(
        &self,
        access_token: &str,
        request: &SlotRequest<'_>,
    ) -> Result<UploadSlot, ApiError>;

    /// Stream `archive` to the slot. `progress` sees cumulative byte counts
    /// and is called with `size` once the upload has been accepted.
    async fn upload(
        &self,
        slot: &UploadSlot,
        archive: &Path,
        size: u64,
        progress: ProgressSink,
    ) -> Result<(), ApiError>;
}

/// Classify an upload-slot reply.
///
/// An `error` object is a denial whatever the status. A reply without an
/// error must carry `"success": true` with both `endpoint` and `token`;
/// anything else is a protocol violation.
pub fn parse_slot_response(status: StatusCode, body: &str) -> Result<UploadSlot, ApiError> {
    let raw = serde_json::from_str::<RawSubmissionBody>(body).ok();

    if let Some(error) = raw.as_ref().and_then(|r| r.error.as_ref()) {
        return Err(ApiError::SlotDenied {
            code: error.code().to_string(),
            message: error.message().unwrap_or_else(|| error.code()).to_string(),
        });
    }
    if !status.is_success() {
        return Err(ApiError::from_status(status, body));
    }

    let raw = raw.ok_or_else(|| {
        ApiError::InvalidResponse(format!(
            "upload slot reply is not JSON: {}",
            ApiError::truncate_body(body)
        ))
    })?;
    if raw.success != Some(true) {
        return Err(ApiError::InvalidResponse(
            "upload slot reply does not report success".to_string(),
        ));
    }

    match (raw.endpoint, raw.token) {
        (Some(endpoint), Some(token)) if !endpoint.is_empty() && !token.is_empty() => {
            Ok(UploadSlot { endpoint, token })
        }
        _ => Err(ApiError::InvalidResponse(
            "upload slot reply is missing endpoint or token".to_string(),
        )),
    }
}

/// Classify an upload reply. Every failure becomes [`ApiError::Upload`].
pub fn parse_upload_response(status: StatusCode, body: &str) -> Result<(), ApiError> {
    let unknown = |message: String| ApiError::Upload {
        code: UNKNOWN_ERROR_CODE.to_string(),
        message,
    };

    let raw = if body.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<RawSubmissionBody>(body) {
            Ok(raw) => Some(raw),
            Err(_) if status.is_success() => {
                return Err(unknown(format!(
                    "unexpected upload reply: {}",
                    ApiError::truncate_body(body)
                )))
            }
            Err(_) => None,
        }
    };

    if let Some(error) = raw.as_ref().and_then(|r| r.error.as_ref()) {
        return Err(ApiError::Upload {
            code: error.code().to_string(),
            message: error.message().unwrap_or_else(|| error.code()).to_string(),
        });
    }
    if !status.is_success() {
        return Err(unknown(format!(
            "HTTP {}: {}",
            status,
            ApiError::truncate_body(body)
        )));
    }
    if raw.and_then(|r| r.success) == Some(false) {
        return Err(unknown("upload reply reports failure without an error".to_string()));
    }
    Ok(())
}

/// Hooks for rendering submission progress. Every method defaults to a
/// no-op.
pub trait SubmitObserver: Send + Sync {
    fn entry_packed(&self, _path: &Path) {}

    fn archive_ready(&self, _stats: PackStats, _size: u64) {}

    fn slot_granted(&self) {}

    fn bytes_sent(&self, _sent: u64, _total: u64) {}
}

impl SubmitObserver for () {}

/// What was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub competition: String,
    pub environment: Option<String>,
    pub size: u64,
    pub stats: PackStats,
}

pub struct Uploader<T> {
    transport: T,
}

impl<T: UploadTransport> Uploader<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn request_slot(
        &self,
        access_token: &str,
        submission: &PreparedSubmission,
        size: u64,
    ) -> Result<UploadSlot, ApiError> {
        let request = SlotRequest {
            competition_tag: &submission.competition,
            environment_tag: submission.environment.as_deref(),
            metadata: &submission.metadata,
            size,
        };
        debug!(
            competition = %submission.competition,
            environment = ?submission.environment,
            size,
            "Requesting upload slot"
        );
        self.transport.request_slot(access_token, &request).await
    }

    /// Upload `archive` into `slot`, consuming the slot.
    pub async fn upload(
        &self,
        slot: UploadSlot,
        archive: &PackedArchive,
        progress: ProgressSink,
    ) -> Result<(), ApiError> {
        self.transport
            .upload(&slot, archive.path(), archive.size(), progress)
            .await
    }

    /// Pack `directory`, request a slot for the archive and upload it.
    ///
    /// The temporary archive is deleted on every exit path.
    pub async fn submit(
        &self,
        access_token: &str,
        directory: &Path,
        submission: &PreparedSubmission,
        observer: Arc<dyn SubmitObserver>,
    ) -> Result<SubmissionReceipt, DoxaError> {
        let entries = observer.clone();
        let archive = pack_in_background(
            directory.to_path_buf(),
            submission.exclusions.clone(),
            move |path| entries.entry_packed(path),
        )
        .await?;
        let size = archive.size();
        observer.archive_ready(archive.stats(), size);

        let slot = self.request_slot(access_token, submission, size).await?;
        observer.slot_granted();

        let sink_observer = observer.clone();
        let progress: ProgressSink = Arc::new(move |sent: u64| sink_observer.bytes_sent(sent, size));
        self.upload(slot, &archive, progress).await?;

        info!(competition = %submission.competition, size, "Submission uploaded");
        Ok(SubmissionReceipt {
            competition: submission.competition.clone(),
            environment: submission.environment.clone(),
            size,
            stats: archive.stats(),
        })
    }
}

/// Run the blocking packer off the async runtime.
pub async fn pack_in_background<F>(
    directory: PathBuf,
    rules: ExclusionRules,
    on_entry: F,
) -> Result<PackedArchive, PackagingError>
where
    F: FnMut(&Path) + Send + 'static,
{
    tokio::task::spawn_blocking(move || pack_to_tempfile(&directory, &rules, on_entry))
        .await
        .map_err(|e| PackagingError::Io(io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_success() {
        let slot = parse_slot_response(
            StatusCode::OK,
            r#"{"success": true, "endpoint": "https://local-1.storage.doxaai.com/upload", "token": "slot-token"}"#,
        )
        .unwrap();
        assert_eq!(slot.endpoint, "https://local-1.storage.doxaai.com/upload");
        assert_eq!(slot.token, "slot-token");
    }

    #[test]
    fn test_slot_denied_regardless_of_status() {
        for status in [StatusCode::OK, StatusCode::FORBIDDEN] {
            let err = parse_slot_response(
                status,
                r#"{"success": false, "error": {"code": "COMPETITION_CLOSED", "message": "The competition has ended."}}"#,
            )
            .unwrap_err();
            match err {
                ApiError::SlotDenied { code, message } => {
                    assert_eq!(code, "COMPETITION_CLOSED");
                    assert_eq!(message, "The competition has ended.");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_slot_denied_without_code() {
        let err = parse_slot_response(StatusCode::OK, r#"{"error": {"message": "nope"}}"#).unwrap_err();
        assert!(matches!(
            err,
            ApiError::SlotDenied { ref code, ref message } if code == UNKNOWN_ERROR_CODE && message == "nope"
        ));
    }

    #[test]
    fn test_slot_shape_violations_are_transport_errors() {
        let cases = [
            r#"{"success": true, "endpoint": "https://x"}"#,
            r#"{"success": true, "token": "t"}"#,
            r#"{"success": false}"#,
            r#"{"endpoint": "https://x", "token": "t"}"#,
            r#"{"success": null, "endpoint": "https://x", "token": "t"}"#,
            r#"{}"#,
            "gateway timeout",
        ];
        for body in cases {
            let err = parse_slot_response(StatusCode::OK, body).unwrap_err();
            assert!(err.is_transport(), "{} -> {:?}", body, err);
        }
    }

    #[test]
    fn test_slot_http_failure_without_error_object() {
        let err = parse_slot_response(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::ServerError(_)));
    }

    #[test]
    fn test_upload_success() {
        assert!(parse_upload_response(StatusCode::OK, r#"{"success": true}"#).is_ok());
        assert!(parse_upload_response(StatusCode::CREATED, "").is_ok());
    }

    #[test]
    fn test_upload_error_object() {
        for status in [StatusCode::OK, StatusCode::PAYLOAD_TOO_LARGE] {
            let err = parse_upload_response(
                status,
                r#"{"success": false, "error": {"code": "TOO_LARGE", "message": "Archive exceeds 100MB"}}"#,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                ApiError::Upload { ref code, ref message } if code == "TOO_LARGE" && message == "Archive exceeds 100MB"
            ));
        }
    }

    #[test]
    fn test_upload_unknown_failures() {
        let err = parse_upload_response(StatusCode::INTERNAL_SERVER_ERROR, "boom").unwrap_err();
        assert!(matches!(err, ApiError::Upload { ref code, .. } if code == UNKNOWN_ERROR_CODE));

        let err = parse_upload_response(StatusCode::OK, r#"{"success": false}"#).unwrap_err();
        assert!(matches!(err, ApiError::Upload { ref code, .. } if code == UNKNOWN_ERROR_CODE));

        let err = parse_upload_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Upload { ref code, .. } if code == UNKNOWN_ERROR_CODE));
    }
}
