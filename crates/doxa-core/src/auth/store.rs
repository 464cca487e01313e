use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::session::{parse_expiry, Session};

/// Credential file name in the config directory
const CREDENTIAL_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No credentials are stored")]
    NotFound,

    #[error("Credential file is corrupted: {0}")]
    Corrupted(String),

    #[error("Credential file I/O error: {0}")]
    Io(#[from] io::Error),
}

/// On-disk shape of the credential file before validation.
#[derive(Debug, Deserialize)]
struct StoredSession {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
}

/// Persists the single active session.
///
/// Absence of the credential file means "signed out". A file that exists but
/// lacks a usable `access_token` or `expires_at` is reported as
/// [`StoreError::Corrupted`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE)
    }

    pub fn load(&self) -> Result<Session, StoreError> {
        let path = self.path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let contents = String::from_utf8(bytes)
            .map_err(|e| StoreError::Corrupted(format!("not UTF-8: {}", e)))?;

        let stored: StoredSession = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupted(format!("invalid JSON: {}", e)))?;

        let access_token = stored
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StoreError::Corrupted("missing access_token".to_string()))?;

        let raw_expiry = stored
            .expires_at
            .ok_or_else(|| StoreError::Corrupted("missing expires_at".to_string()))?;
        let expires_at = parse_expiry(&raw_expiry)
            .ok_or_else(|| StoreError::Corrupted(format!("unparseable expires_at: {}", raw_expiry)))?;

        Ok(Session {
            access_token,
            refresh_token: stored.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }

    /// Write the full record, replacing whatever was stored.
    ///
    /// The record is written to a sibling temp file and renamed into place so
    /// an interrupted write never leaves a half-written credential file.
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let tmp = self.dir.join(format!("{}.tmp", CREDENTIAL_FILE));
        std::fs::write(&tmp, contents)?;

        // Tokens grant account access; keep them owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)) {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
        }

        if let Err(e) = std::fs::rename(&tmp, self.path()) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path().display(), "Saved credentials");
        Ok(())
    }

    /// Remove the record, then the directory if nothing else lives in it.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(e.into()),
        }

        let is_empty = std::fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            std::fs::remove_dir(&self.dir)?;
        }
        debug!(path = %self.path().display(), "Cleared credentials");
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }
}
