//! OAuth device authorization grant.
//!
//! A login runs as an explicit state machine: the device code is requested
//! once, then a [`DevicePoller`] polls the token endpoint until it reaches a
//! terminal [`PollState`]. Each poll yields an observable state so callers can
//! render progress and tests can drive the loop with scripted replies.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::session::expiry_after;
use super::{AuthError, AuthTransport, CredentialStore, Session};
use crate::api::{ApiError, DeviceCodeResponse, TokenReply, TokenResponse};

/// Seconds added to the poll interval each time the server answers
/// `slow_down`. The increase is kept for the rest of the login.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

/// A pending device login. Lives for one login attempt and is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub interval: Duration,
    pub expires_at: DateTime<Utc>,
}

impl DeviceAuthorization {
    /// `requested_at` must be sampled before the device-code request was
    /// sent, so the deadline never stretches by network latency.
    pub fn from_response(
        response: DeviceCodeResponse,
        requested_at: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        let expires_at = expiry_after(requested_at, response.expires_in).ok_or_else(|| {
            ApiError::InvalidResponse(format!(
                "device code expires_in out of range: {}",
                response.expires_in
            ))
        })?;

        Ok(Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            verification_uri_complete: response.verification_uri_complete,
            interval: Duration::from_secs(response.interval),
            expires_at,
        })
    }

    /// URL to show the user, preferring the one with the code embedded.
    pub fn verification_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum PollState {
    /// Still waiting for the user; the next poll happens after `interval`.
    Pending { interval: Duration },
    Success(TokenResponse),
    Expired,
    AuthError {
        code: String,
        description: Option<String>,
    },
    TransportError(ApiError),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending { .. })
    }
}

/// Drives the device authorization grant against an [`AuthTransport`].
pub struct DeviceFlow<T> {
    transport: T,
}

impl<T: AuthTransport> DeviceFlow<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Request a device code and user code.
    pub async fn request(&self) -> Result<DeviceAuthorization, AuthError> {
        let requested_at = Utc::now();
        let response = self.transport.request_device_code().await?;
        let authorization = DeviceAuthorization::from_response(response, requested_at)?;
        debug!(
            interval_secs = authorization.interval.as_secs(),
            expires_at = %authorization.expires_at,
            "Device code issued"
        );
        Ok(authorization)
    }

    pub fn poller(&self, authorization: &DeviceAuthorization) -> DevicePoller<'_, T> {
        DevicePoller {
            transport: &self.transport,
            device_code: authorization.device_code.clone(),
            interval: authorization.interval,
            expires_at: authorization.expires_at,
            polls: 0,
        }
    }

    /// Poll until the login resolves, then persist the new session.
    ///
    /// The store is untouched unless the token endpoint grants a token, and
    /// the session is only returned once it has been written. `cancel`
    /// aborts the wait (e.g. on Ctrl-C) and leaves the store unchanged.
    pub async fn login<C, F>(
        &self,
        authorization: &DeviceAuthorization,
        store: &CredentialStore,
        cancel: C,
        observe: F,
    ) -> Result<Session, AuthError>
    where
        C: Future<Output = ()>,
        F: FnMut(&PollState),
    {
        let token = self.poller(authorization).run(cancel, observe).await?;

        let session = Session::from_grant(&token, Utc::now(), None)?;
        store.save(&session).map_err(AuthError::CredentialsNotSaved)?;
        info!(expires_at = %session.expires_at, "Logged in");
        Ok(session)
    }
}

/// Polls the token endpoint for one device code.
pub struct DevicePoller<'a, T> {
    transport: &'a T,
    device_code: String,
    interval: Duration,
    expires_at: DateTime<Utc>,
    polls: u32,
}

impl<'a, T: AuthTransport> DevicePoller<'a, T> {
    /// Current wait between polls, including any `slow_down` increases.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of token endpoint requests made so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Make one poll, unless the device code has already expired at `now`.
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> PollState {
        if now >= self.expires_at {
            return PollState::Expired;
        }

        self.polls += 1;
        match self.transport.poll_device_token(&self.device_code).await {
            Ok(TokenReply::Granted(token)) => PollState::Success(token),
            Ok(TokenReply::Pending) => PollState::Pending {
                interval: self.interval,
            },
            Ok(TokenReply::SlowDown) => {
                self.interval += SLOW_DOWN_INCREMENT;
                debug!(interval_secs = self.interval.as_secs(), "Server asked to slow down");
                PollState::Pending {
                    interval: self.interval,
                }
            }
            Ok(TokenReply::Rejected { code, description }) => PollState::AuthError { code, description },
            Err(e) => PollState::TransportError(e),
        }
    }

    /// Poll until a terminal state, sleeping `interval` between polls.
    ///
    /// Only one request is ever in flight. `observe` sees every state,
    /// including the terminal one.
    pub async fn run<C, F>(mut self, cancel: C, mut observe: F) -> Result<TokenResponse, AuthError>
    where
        C: Future<Output = ()>,
        F: FnMut(&PollState),
    {
        tokio::pin!(cancel);

        loop {
            let state = tokio::select! {
                biased;
                _ = &mut cancel => return Err(AuthError::Cancelled),
                state = self.poll_once(Utc::now()) => state,
            };
            observe(&state);

            match state {
                PollState::Pending { .. } => {}
                PollState::Success(token) => return Ok(token),
                PollState::Expired => return Err(AuthError::DeviceCodeExpired),
                PollState::AuthError { code, description } => {
                    return Err(AuthError::AuthorizationFailed { code, description })
                }
                PollState::TransportError(e) => return Err(AuthError::Transport(e)),
            }

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(AuthError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
