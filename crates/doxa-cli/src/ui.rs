//! Terminal rendering: spinners, the upload progress bar and error reports.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use doxa_core::api::ApiError;
use doxa_core::auth::AuthError;
use doxa_core::submission::PackStats;
use doxa_core::{DoxaError, SlotDenialKind, SubmitObserver};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const UPLOAD_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(TICK_INTERVAL);
    bar
}

/// Renders packaging as a running file count, then the upload as a byte
/// progress bar.
pub struct SubmissionProgress {
    bar: ProgressBar,
    packed: AtomicU64,
}

impl SubmissionProgress {
    pub fn new() -> Self {
        Self {
            bar: spinner("Packaging your agent..."),
            packed: AtomicU64::new(0),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl SubmitObserver for SubmissionProgress {
    fn entry_packed(&self, path: &Path) {
        let count = self.packed.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar
            .set_message(format!("Packaging your agent ({} entries) {}", count, path.display()));
    }

    fn archive_ready(&self, stats: PackStats, size: u64) {
        self.bar.println(format!(
            "Packaged {} files in {} directories ({} compressed).",
            stats.files,
            stats.directories,
            HumanBytes(size)
        ));
        self.bar.set_message("Requesting an upload slot...");
    }

    fn slot_granted(&self) {
        self.bar.set_length(0);
        self.bar.set_style(
            ProgressStyle::with_template(UPLOAD_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
    }

    fn bytes_sent(&self, sent: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(sent);
    }
}

/// Render a command failure with a hint about what to do next.
pub fn describe_error(err: &anyhow::Error) -> String {
    let (message, hint) = if let Some(e) = err.downcast_ref::<DoxaError>() {
        match e {
            DoxaError::Auth(auth) => (auth.to_string(), auth_hint(auth)),
            DoxaError::Api(api) => (api.to_string(), api_hint(api)),
            DoxaError::Manifest(manifest) => (manifest.to_string(), None),
            DoxaError::Packaging(packaging) => (packaging.to_string(), None),
        }
    } else if let Some(auth) = err.downcast_ref::<AuthError>() {
        (auth.to_string(), auth_hint(auth))
    } else if let Some(api) = err.downcast_ref::<ApiError>() {
        (api.to_string(), api_hint(api))
    } else {
        (format!("{:#}", err), None)
    };

    match hint {
        Some(hint) => format!("{}\n{}", message, hint),
        None => message,
    }
}

fn auth_hint(err: &AuthError) -> Option<&'static str> {
    match err {
        AuthError::SignedOut | AuthError::SessionExpired => Some("Run `doxa login` to log in."),
        AuthError::DeviceCodeExpired | AuthError::AuthorizationFailed { .. } => {
            Some("Run `doxa login` to try again.")
        }
        AuthError::CredentialsNotSaved(_) => {
            Some("Check that the configuration directory is writable, then run `doxa login` again.")
        }
        AuthError::Transport(api) => api_hint(api),
        _ => None,
    }
}

fn api_hint(err: &ApiError) -> Option<&'static str> {
    if let Some(kind) = err.slot_denial_kind() {
        return match kind {
            SlotDenialKind::InvalidTags => Some(
                "Check the competition and environment in doxa.yaml, or pass --competition / --environment.",
            ),
            SlotDenialKind::CompetitionClosed => Some("This competition is no longer accepting submissions."),
            SlotDenialKind::SubmissionTooLarge => {
                Some("Add files your agent does not need at run time to `ignore` in doxa.yaml.")
            }
            SlotDenialKind::RateLimited => Some("You have submitted too often; wait a while and try again."),
            SlotDenialKind::InvalidMetadata => Some("Check the keys in your doxa.yaml."),
            SlotDenialKind::StorageNodeUnavailable => {
                Some("DOXA cannot accept uploads right now; please try again later.")
            }
            SlotDenialKind::Unknown => None,
        };
    }
    match err {
        ApiError::Unauthorized => Some("Run `doxa login` to log in again."),
        ApiError::NetworkError(_) => Some("Check your internet connection and try again."),
        _ => None,
    }
}
