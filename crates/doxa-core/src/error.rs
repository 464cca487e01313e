use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;
use crate::submission::{ManifestError, PackagingError};

/// Any failure a command can end with.
#[derive(Error, Debug)]
pub enum DoxaError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T, E = DoxaError> = std::result::Result<T, E>;
