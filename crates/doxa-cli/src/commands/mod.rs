//! One module per `doxa` subcommand.

pub mod config;
pub mod login;
pub mod logout;
pub mod upload;
pub mod user;

use anyhow::Result;
use doxa_core::{ApiClient, Config, TokenManager};

/// Token manager backed by the platform for authenticated commands.
fn token_manager(config: &Config) -> Result<TokenManager<ApiClient>> {
    let client = ApiClient::new(config.clone())?;
    Ok(TokenManager::new(config.credential_store(), client))
}

pub fn version() {
    println!(
        "\nYou are running DOXA CLI version {}",
        env!("CARGO_PKG_VERSION")
    );
}
