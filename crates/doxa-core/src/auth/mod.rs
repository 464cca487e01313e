//! Authentication: device login, token lifecycle and credential storage.
//!
//! This module provides:
//! - `CredentialStore`: the on-disk record of the single active session
//! - `TokenManager`: returns a usable access token, refreshing silently
//! - `DeviceFlow`: the OAuth device authorization grant used by `login`
//!
//! Network access goes through the `AuthTransport` trait so the lifecycle
//! and polling logic can run against scripted replies.

pub mod device;
pub mod error;
pub mod session;
pub mod store;
pub mod tokens;

use async_trait::async_trait;

use crate::api::{ApiError, DeviceCodeResponse, TokenReply};

pub use device::{DeviceAuthorization, DeviceFlow, DevicePoller, PollState};
pub use error::AuthError;
pub use session::Session;
pub use store::{CredentialStore, StoreError};
pub use tokens::TokenManager;

/// OAuth endpoints used by login and refresh.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn request_device_code(&self) -> Result<DeviceCodeResponse, ApiError>;

    async fn poll_device_token(&self, device_code: &str) -> Result<TokenReply, ApiError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenReply, ApiError>;
}
