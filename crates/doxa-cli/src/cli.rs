//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// The DOXA CLI is the primary tool for uploading agents to DOXA.
#[derive(Parser, Debug, Clone)]
#[command(name = "doxa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in with your DOXA account.
    Login,

    /// Log out of your DOXA account.
    Logout,

    /// Display information on the currently logged in user.
    User,

    /// Upload and submit an agent to DOXA.
    Upload {
        /// Directory containing the agent and its doxa.yaml manifest.
        directory: PathBuf,

        /// Competition to submit to, overriding the manifest.
        #[arg(short, long)]
        competition: Option<String>,

        /// Environment to run in, overriding the manifest.
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Show where the CLI points and where it keeps credentials.
    #[command(hide = true)]
    Config {
        /// Delete the stored credentials.
        #[arg(long)]
        reset: bool,
    },

    /// Give the version of the DOXA CLI.
    Version,
}
