//! HTTP client module for the DOXA platform.
//!
//! This module provides the `ApiClient` for the OAuth device-code and token
//! endpoints, the user endpoint, and the submission endpoints (upload slot
//! and archive upload).
//!
//! Every failure is surfaced as an `ApiError`; raw transport errors never
//! leave this module unclassified.

pub mod client;
pub mod error;
pub mod types;

pub use client::ApiClient;
pub use error::{ApiError, SlotDenialKind};
pub use types::{
    DeviceCodeResponse, ErrorField, SlotRequest, TokenReply, TokenResponse, UploadSlot, UserInfo,
    UNKNOWN_ERROR_CODE,
};
