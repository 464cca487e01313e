use anyhow::Result;
use doxa_core::auth::PollState;
use doxa_core::{ApiClient, Config, DeviceFlow};
use tracing::debug;

use crate::ui;

pub async fn run(config: &Config) -> Result<()> {
    let flow = DeviceFlow::new(ApiClient::new(config.clone())?);
    let authorization = flow.request().await?;

    println!("\nUse the link below to log into the CLI using your DOXA account:");
    println!("{}", authorization.verification_url());
    println!("\nConfirm that the code shown in your browser is {}", authorization.user_code);

    match open::that(authorization.verification_url()) {
        Ok(()) => println!("\nThe verification link has been opened in your default browser.\n"),
        Err(e) => {
            debug!(error = %e, "Could not open a browser");
            println!();
        }
    }

    let spinner = ui::spinner("Waiting for you to authorise the CLI...");
    let result = flow
        .login(
            &authorization,
            &config.credential_store(),
            interrupted(),
            |state| {
                if let PollState::Pending { interval } = state {
                    spinner.set_message(format!(
                        "Waiting for you to authorise the CLI (checking every {}s)...",
                        interval.as_secs()
                    ));
                }
            },
        )
        .await;
    spinner.finish_and_clear();
    result?;

    println!("Authorisation successful - you are now logged in!");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
