//! DOXA core library.
//!
//! Everything the `doxa` command needs except the terminal: configuration,
//! OAuth device login and the credential file, silent token refresh,
//! manifest resolution, archive packaging, and the two-phase upload
//! (slot request, then archive transfer).

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod submission;
pub mod upload;

pub use api::{ApiClient, ApiError, SlotDenialKind};
pub use auth::{AuthError, CredentialStore, DeviceFlow, Session, TokenManager};
pub use config::Config;
pub use error::{DoxaError, Result};
pub use upload::{SubmissionReceipt, SubmitObserver, Uploader};
