mod presenter;

use std::sync::Arc;

use anyhow::Context;
use qmc_auth::config::default_data_dir;
use qmc_auth::{
    AuthConfig, AuthCoordinator, AuthError, DelegationChainClient, ErrorKind, FileCredentialStore,
};
use tracing_subscriber::EnvFilter;

use crate::presenter::BrowserPresenter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AuthConfig::from_env().context("invalid launcher configuration")?;
    init_tracing(config.debug_hops);

    let data_dir = default_data_dir()?;
    let store = FileCredentialStore::new(&data_dir)
        .await
        .with_context(|| format!("cannot use data directory {}", data_dir.display()))?;
    let client = DelegationChainClient::new(config)?;

    let presenter = Arc::new(BrowserPresenter::new());
    let coordinator = AuthCoordinator::new(client, Arc::new(store), presenter);

    match coordinator.authenticate().await {
        Ok(authenticated) => {
            let credential = authenticated.credential;
            println!(
                "Authenticated as {} ({})",
                credential.display_name, credential.subject_id
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", explain(&e));
            Err(e.into())
        }
    }
}

fn init_tracing(debug_hops: bool) {
    let default = if debug_hops { "info,qmc_auth=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn explain(e: &AuthError) -> &'static str {
    match e.kind() {
        ErrorKind::TransientNetwork => {
            "Could not reach the login services. Check your connection and try again."
        }
        ErrorKind::InvalidOrExpiredToken => "Your login expired. Run the launcher again to log in.",
        ErrorKind::EntitlementDenied => "This account cannot play Minecraft: Java Edition.",
        ErrorKind::AppConfiguration => {
            "The launcher's Azure app is not allowed to log in to Minecraft. Set QUICKMC_CLIENT_ID to an approved app."
        }
        ErrorKind::CallbackTimeout => "The login page was not completed in time.",
        ErrorKind::CacheCorrupt => "The saved login data is unreadable and was ignored.",
        ErrorKind::Cancelled => "Login was cancelled.",
        ErrorKind::Internal => "Login failed.",
    }
}
