use std::path::PathBuf;

use thiserror::Error;

use super::StoreError;
use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("You are not logged in")]
    SignedOut,

    #[error("Your session has expired - please log in again")]
    SessionExpired,

    #[error("The credential file at {} could not be read and could not be reset - please delete it manually", .0.display())]
    CorruptedConfiguration(PathBuf),

    #[error("The device code expired before the login was approved")]
    DeviceCodeExpired,

    #[error("Authorization failed: {code}{}", .description.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    AuthorizationFailed {
        code: String,
        description: Option<String>,
    },

    #[error("Login was cancelled")]
    Cancelled,

    #[error("Authorization succeeded, but the credentials could not be saved: {0}")]
    CredentialsNotSaved(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] ApiError),
}
