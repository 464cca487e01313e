use anyhow::Result;
use doxa_core::auth::StoreError;
use doxa_core::Config;

pub fn run(config: &Config, reset: bool) -> Result<()> {
    let store = config.credential_store();
    println!("\nDOXA URL: {}", config.base_url());
    println!("CONFIG PATH: {}", store.path().display());

    if !reset {
        return Ok(());
    }
    match store.clear() {
        Ok(()) => println!("\nThe configuration file was deleted successfully."),
        Err(StoreError::NotFound) => {
            println!("\nThere is no configuration file at that location to delete.")
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Unable to reset the configuration, please delete {} manually",
                store.path().display()
            )))
        }
    }
    Ok(())
}
