//! DOXA CLI - log in to DOXA and submit agents from the terminal.

mod cli;
mod commands;
mod ui;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use doxa_core::Config;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=doxa_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();
    debug!(base_url = %config.base_url(), config_dir = %config.config_dir().display(), "Starting");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {}", ui::describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Commands::Login => commands::login::run(config).await,
        Commands::Logout => commands::logout::run(config),
        Commands::User => commands::user::run(config).await,
        Commands::Upload {
            directory,
            competition,
            environment,
        } => {
            commands::upload::run(
                config,
                &directory,
                competition.as_deref(),
                environment.as_deref(),
            )
            .await
        }
        Commands::Config { reset } => commands::config::run(config, reset),
        Commands::Version => {
            commands::version();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_config(dir: &TempDir) -> Config {
        Config::new("http://127.0.0.1:9", dir.path())
    }

    #[tokio::test]
    async fn test_user_without_login_is_signed_out() {
        let dir = TempDir::new().unwrap();
        let err = run(Cli::parse_from(["doxa", "user"]), &offline_config(&dir))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<doxa_core::AuthError>(),
            Some(doxa_core::AuthError::SignedOut)
        ));
    }

    #[tokio::test]
    async fn test_logout_without_login_succeeds() {
        let dir = TempDir::new().unwrap();
        run(Cli::parse_from(["doxa", "logout"]), &offline_config(&dir))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_without_manifest_fails_before_login_check() {
        let dir = TempDir::new().unwrap();
        let agent = TempDir::new().unwrap();
        let err = run(
            Cli::parse_from(["doxa", "upload", agent.path().to_str().unwrap()]),
            &offline_config(&dir),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<doxa_core::DoxaError>(),
            Some(doxa_core::DoxaError::Manifest(_))
        ));
    }
}
