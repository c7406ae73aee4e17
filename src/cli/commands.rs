//! Command handlers; each returns the text the CLI prints

use anyhow::{anyhow, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Command, CreateUserArgs, HashPasswordArgs, UserSelector, VerifyArgs};
use crate::domain::user::{IdentityResult, User, UserId, UserPasswordStore, UserRepository, UserStore};
use crate::infrastructure::user::{Argon2Hasher, CredentialStore, PasswordHasher, PasswordVerification};

/// Store as wired by the CLI host
pub type HostStore = CredentialStore<dyn UserRepository, Argon2Hasher>;

pub(super) async fn execute<H>(
    store: &CredentialStore<dyn UserRepository, H>,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    H: PasswordHasher + ?Sized,
{
    match command {
        Command::InitSchema => bail!("init-schema runs against PostgreSQL only"),
        Command::CreateUser(args) => create_user(store, args, cancel).await,
        Command::ShowUser(selector) => show_user(store, selector, cancel).await,
        Command::HashPassword(args) => hash_password(store, args, cancel).await,
        Command::Verify(args) => verify(store, args, cancel).await,
    }
}

async fn create_user<H>(
    store: &CredentialStore<dyn UserRepository, H>,
    args: CreateUserArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    H: PasswordHasher + ?Sized,
{
    if store.find_by_name(&args.name, cancel).await?.is_some() {
        bail!("User '{}' already exists", args.name);
    }

    let mut user = User::new(&args.name, args.role);
    user.set_active(!args.inactive);
    store.set_password_hash(&mut user, &args.password, cancel).await?;

    ensure_succeeded(store.create(&mut user, cancel).await?)?;

    Ok(serde_json::to_string_pretty(&user)?)
}

async fn show_user<H>(
    store: &CredentialStore<dyn UserRepository, H>,
    selector: UserSelector,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    H: PasswordHasher + ?Sized,
{
    let user = match (&selector.id, &selector.name) {
        (Some(id), _) => store.find_by_id(id, cancel).await?,
        (None, Some(name)) => store.find_by_name(name, cancel).await?,
        (None, None) => bail!("Either --id or --name is required"),
    };

    let user = user.ok_or_else(|| anyhow!("User not found"))?;
    Ok(serde_json::to_string_pretty(&user)?)
}

async fn hash_password<H>(
    store: &CredentialStore<dyn UserRepository, H>,
    args: HashPasswordArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    H: PasswordHasher + ?Sized,
{
    let user_id: UserId = args.id.parse()?;

    let result = if args.force {
        store.hash_and_save_password(user_id, cancel).await?
    } else {
        store.migrate_legacy_password(user_id, cancel).await?
    };

    ensure_succeeded(result)?;
    Ok(format!("Password of user {} hashed", user_id))
}

async fn verify<H>(
    store: &CredentialStore<dyn UserRepository, H>,
    args: VerifyArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    H: PasswordHasher + ?Sized,
{
    let Some(mut user) = store.find_by_name(&args.name, cancel).await? else {
        bail!("Account not found");
    };

    if !user.is_active() {
        bail!("Account is disabled");
    }

    match store.hasher().verify(&user, user.password_hash(), &args.password) {
        PasswordVerification::Failed => bail!("Invalid password"),
        PasswordVerification::Success => Ok("Password verified".to_string()),
        PasswordVerification::SuccessRehashNeeded => {
            store.set_password_hash(&mut user, &args.password, cancel).await?;
            ensure_succeeded(store.update(&user, cancel).await?)?;
            info!(user_id = ?user.id(), "Upgraded outdated password hash");
            Ok("Password verified, hash upgraded".to_string())
        }
    }
}

fn ensure_succeeded(result: IdentityResult) -> anyhow::Result<()> {
    if result.succeeded() {
        return Ok(());
    }

    let reasons: Vec<&str> = result
        .errors()
        .iter()
        .map(|e| e.description.as_str())
        .collect();
    bail!("{}", reasons.join(" "))
}
