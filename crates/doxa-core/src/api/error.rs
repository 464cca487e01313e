use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Upload slot denied ({code}): {message}")]
    SlotDenied { code: String, message: String },

    #[error("Upload failed ({code}): {message}")]
    Upload { code: String, message: String },

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Could not read archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Business-rule reasons the platform gives for refusing an upload slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotDenialKind {
    InvalidTags,
    CompetitionClosed,
    SubmissionTooLarge,
    RateLimited,
    InvalidMetadata,
    StorageNodeUnavailable,
    Unknown,
}

impl SlotDenialKind {
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "INVALID_TAGS" | "INVALID_COMPETITION" | "INVALID_ENVIRONMENT" => SlotDenialKind::InvalidTags,
            "COMPETITION_CLOSED" => SlotDenialKind::CompetitionClosed,
            "SUBMISSION_TOO_LARGE" | "TOO_LARGE" => SlotDenialKind::SubmissionTooLarge,
            "RATE_LIMITED" | "RATE_LIMIT_EXCEEDED" => SlotDenialKind::RateLimited,
            "INVALID_METADATA" => SlotDenialKind::InvalidMetadata,
            "STORAGE_NODE_UNAVAILABLE" | "NO_STORAGE_NODE" => SlotDenialKind::StorageNodeUnavailable,
            _ => SlotDenialKind::Unknown,
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Denial classification, for `SlotDenied` errors only.
    pub fn slot_denial_kind(&self) -> Option<SlotDenialKind> {
        match self {
            ApiError::SlotDenied { code, .. } => Some(SlotDenialKind::from_code(code)),
            _ => None,
        }
    }

    /// True for network and protocol-shape failures that carry no server
    /// verdict.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkError(_)
                | ApiError::InvalidResponse(_)
                | ApiError::ServerError(_)
                | ApiError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_denial_kind_from_code() {
        assert_eq!(
            SlotDenialKind::from_code("COMPETITION_CLOSED"),
            SlotDenialKind::CompetitionClosed
        );
        assert_eq!(
            SlotDenialKind::from_code("rate_limited"),
            SlotDenialKind::RateLimited
        );
        assert_eq!(
            SlotDenialKind::from_code("SUBMISSION_TOO_LARGE"),
            SlotDenialKind::SubmissionTooLarge
        );
        assert_eq!(SlotDenialKind::from_code("SOMETHING_NEW"), SlotDenialKind::Unknown);
    }

    #[test]
    fn test_truncate_body() {
        let short = "oops";
        assert_eq!(ApiError::truncate_body(short), "oops");

        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("510 total bytes"));
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::BAD_GATEWAY, "down"),
            ApiError::ServerError(_)
        ));
        assert!(ApiError::from_status(reqwest::StatusCode::IM_A_TEAPOT, "").is_transport());
    }

    #[test]
    fn test_slot_denied_display() {
        let err = ApiError::SlotDenied {
            code: "COMPETITION_CLOSED".to_string(),
            message: "Submissions are closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Upload slot denied (COMPETITION_CLOSED): Submissions are closed"
        );
        assert_eq!(err.slot_denial_kind(), Some(SlotDenialKind::CompetitionClosed));
    }
}
