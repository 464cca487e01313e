use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use doxa_core::submission::prepare;
use doxa_core::{Config, DoxaError, Uploader};
use indicatif::HumanBytes;

use super::token_manager;
use crate::ui::SubmissionProgress;

pub async fn run(
    config: &Config,
    directory: &Path,
    competition: Option<&str>,
    environment: Option<&str>,
) -> Result<()> {
    let submission = prepare(directory, competition, environment).map_err(DoxaError::from)?;

    let tokens = token_manager(config)?;
    let access_token = tokens.access_token().await.map_err(DoxaError::from)?;

    println!(
        "\nSubmitting to {}{}",
        submission.competition,
        submission
            .environment
            .as_deref()
            .map(|env| format!(" ({})", env))
            .unwrap_or_default()
    );

    let progress = Arc::new(SubmissionProgress::new());
    let uploader = Uploader::new(tokens.transport().clone());
    let result = uploader
        .submit(&access_token, directory, &submission, progress.clone())
        .await;
    progress.finish();
    let receipt = result?;

    println!(
        "Your agent has been uploaded ({}) and submitted to {}!",
        HumanBytes(receipt.size),
        receipt.competition
    );
    Ok(())
}
