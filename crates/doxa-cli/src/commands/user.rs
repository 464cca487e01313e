use anyhow::Result;
use chrono::Utc;
use doxa_core::Config;

use super::token_manager;
use crate::ui;

pub async fn run(config: &Config) -> Result<()> {
    let tokens = token_manager(config)?;
    let access_token = tokens.access_token().await?;

    let spinner = ui::spinner("Fetching your user information...");
    let user = tokens.transport().fetch_user(&access_token).await;
    spinner.finish_and_clear();
    let user = user?;

    println!("\nHello, you are currently logged in as {}!\n", user.username);
    if user.admin {
        println!("[You are an admin.]\n");
    }
    if let Some(days) = user.account_age_days(Utc::now()) {
        println!("You created your account {} days ago.", days);
    }
    Ok(())
}
