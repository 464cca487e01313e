use anyhow::Result;
use doxa_core::auth::StoreError;
use doxa_core::Config;
use tracing::debug;

pub fn run(config: &Config) -> Result<()> {
    match config.credential_store().clear() {
        Ok(()) => println!("\nGoodbye!"),
        Err(StoreError::NotFound) => {
            debug!("No stored credentials to clear");
            println!("\nYou are already logged out.");
        }
        Err(e) => return Err(anyhow::Error::new(e).context("An error occurred while logging you out")),
    }
    Ok(())
}
