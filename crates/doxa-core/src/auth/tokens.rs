use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{AuthError, AuthTransport, CredentialStore, Session, StoreError};
use crate::api::TokenReply;

/// Hands out a usable access token for authenticated commands.
///
/// A stored token that has not reached `expires_at` is returned without any
/// network call. An expired one is refreshed through the refresh-token
/// grant; if that is impossible the store is cleared and the caller must log
/// in again.
pub struct TokenManager<T> {
    store: CredentialStore,
    transport: T,
}

impl<T: AuthTransport> TokenManager<T> {
    pub fn new(store: CredentialStore, transport: T) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn access_token(&self) -> Result<String, AuthError> {
        self.access_token_at(Utc::now()).await
    }

    pub async fn access_token_at(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let session = match self.store.load() {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AuthError::SignedOut),
            Err(StoreError::Corrupted(reason)) => {
                warn!(reason = %reason, "Credential file is corrupted, clearing it");
                self.discard()
                    .map_err(|_| AuthError::CorruptedConfiguration(self.store.path()))?;
                return Err(AuthError::SignedOut);
            }
            Err(e) => return Err(e.into()),
        };

        if !session.is_expired_at(now) {
            return Ok(session.access_token);
        }

        let Some(refresh_token) = session.refresh_token else {
            info!("Session expired and no refresh token is stored");
            self.expire();
            return Err(AuthError::SessionExpired);
        };

        debug!("Access token expired, refreshing");
        let token = match self.transport.refresh_token(&refresh_token).await {
            Ok(TokenReply::Granted(token)) => token,
            Ok(reply) => {
                warn!(reply = ?reply, "Refresh grant was refused");
                self.expire();
                return Err(AuthError::SessionExpired);
            }
            Err(e) => {
                warn!(error = %e, "Refresh grant failed");
                self.expire();
                return Err(AuthError::SessionExpired);
            }
        };

        let refreshed = match Session::from_grant(&token, Utc::now(), Some(refresh_token)) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Refresh grant was unusable");
                self.expire();
                return Err(AuthError::SessionExpired);
            }
        };
        if let Err(e) = self.store.save(&refreshed) {
            warn!(error = %e, "Refreshed token could not be saved; it is valid for this command only");
        } else {
            info!(expires_at = %refreshed.expires_at, "Access token refreshed");
        }
        Ok(refreshed.access_token)
    }

    fn discard(&self) -> Result<(), StoreError> {
        match self.store.clear() {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn expire(&self) {
        if let Err(e) = self.discard() {
            warn!(error = %e, "Could not clear expired session");
        }
    }
}
