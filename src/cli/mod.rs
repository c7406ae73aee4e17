//! CLI module for the credential store
//!
//! A thin host over the identity contract:
//! - `init-schema`: create the `User` table
//! - `create-user`: stage a hashed password and insert a user
//! - `show-user`: look a user up by id or name
//! - `hash-password`: one-shot migration of a legacy plaintext password
//! - `verify`: check a password the way a sign-in would

mod commands;

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::storage::RepositoryFactory;
use crate::infrastructure::user::{Argon2Hasher, CredentialStore};

pub use commands::HostStore;

/// Credential store - identity contract over the `User` table
#[derive(Debug, Parser)]
#[command(name = "credential-store")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the User table if it does not exist
    InitSchema,

    /// Create a user with a hashed password
    CreateUser(CreateUserArgs),

    /// Print a user as JSON (password hash omitted)
    ShowUser(UserSelector),

    /// Hash the legacy plaintext password stored for a user
    HashPassword(HashPasswordArgs),

    /// Verify a password for a user
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub password: String,

    #[arg(long, default_value_t = 1)]
    pub role: i32,

    /// Create the account disabled
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct UserSelector {
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct HashPasswordArgs {
    #[arg(long)]
    pub id: String,

    /// Re-hash even if the stored value already looks hashed
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub password: String,
}

/// Load configuration, wire the store and run one command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let output = match cli.command {
        Command::InitSchema => {
            RepositoryFactory::create_postgres(&config)?
                .ensure_schema(&cancel)
                .await?;
            "User table ready".to_string()
        }
        command => {
            let repository = RepositoryFactory::create(&config)?;
            let store: HostStore = CredentialStore::new(repository, Arc::new(Argon2Hasher::new()));
            commands::execute(&store, command, &cancel).await?
        }
    };

    println!("{}", output);
    Ok(())
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operation");
            cancel.cancel();
        }
    });
}
