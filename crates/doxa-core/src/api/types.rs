//! Wire types for the DOXA OAuth and submission endpoints.

use serde::{Deserialize, Serialize};

use super::ApiError;

/// Poll period used when the device-code response omits `interval`.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    pub expires_in: u64,
}

/// A successful token grant (device code or refresh token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The `error` member of a server reply.
///
/// OAuth endpoints send either a bare string or `{"code": ...}`; the
/// submission endpoints send `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Code(String),
    Detail {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ErrorField {
    pub fn code(&self) -> &str {
        match self {
            ErrorField::Code(code) => code,
            ErrorField::Detail { code, .. } => code.as_deref().unwrap_or(UNKNOWN_ERROR_CODE),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorField::Code(_) => None,
            ErrorField::Detail { message, .. } => message.as_deref(),
        }
    }
}

/// Code used when the server reports an error without one.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Classified reply from the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenReply {
    Granted(TokenResponse),
    Pending,
    SlowDown,
    Rejected { code: String, description: Option<String> },
}

#[derive(Debug, Deserialize)]
struct RawTokenBody {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    error: Option<ErrorField>,
    error_description: Option<String>,
}

impl TokenReply {
    /// Classify a token endpoint body regardless of HTTP status; pending
    /// replies commonly arrive as 400s.
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        let raw: RawTokenBody = serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))?;

        if let Some(error) = raw.error {
            return Ok(match error.code() {
                "authorization_pending" => TokenReply::Pending,
                "slow_down" => TokenReply::SlowDown,
                code => TokenReply::Rejected {
                    code: code.to_string(),
                    description: raw
                        .error_description
                        .or_else(|| error.message().map(str::to_string)),
                },
            });
        }

        match (raw.access_token, raw.expires_in) {
            (Some(access_token), Some(expires_in)) if !access_token.is_empty() => {
                Ok(TokenReply::Granted(TokenResponse {
                    access_token,
                    refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
                    expires_in,
                    token_type: raw.token_type,
                }))
            }
            _ => Err(ApiError::InvalidResponse(
                "token response has neither an error nor an access token".to_string(),
            )),
        }
    }
}

/// Body of the upload-slot request.
#[derive(Debug, Clone, Serialize)]
pub struct SlotRequest<'a> {
    pub competition_tag: &'a str,
    pub environment_tag: Option<&'a str>,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
    pub size: u64,
}

/// A single-use destination and credential for one archive upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    pub endpoint: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSubmissionBody {
    pub success: Option<bool>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub error: Option<ErrorField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: UserInfo,
}

impl UserInfo {
    /// Whole days since the account was created, if the timestamp parses.
    pub fn account_age_days(&self, now: chrono::DateTime<chrono::Utc>) -> Option<i64> {
        let created = chrono::DateTime::parse_from_rfc3339(self.created_at.as_deref()?).ok()?;
        Some((now - created.with_timezone(&chrono::Utc)).num_days())
    }
}
