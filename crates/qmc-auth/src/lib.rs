//! Microsoft account authentication core for the QuickMC launcher
//!
//! This crate turns a Microsoft login into a playable Minecraft credential
//! and keeps it cached so most launches need no network round-trip at all.
//!
//! # Authentication Flow
//!
//! A full login runs these exchanges, each one feeding the next:
//!
//! 1. OAuth2 authorization code (PKCE) exchange with Microsoft
//! 2. Xbox Live authentication
//! 3. XSTS authorization
//! 4. Minecraft Services login
//! 5. Profile retrieval
//!
//! The authorization code reaches the launcher through a one-shot HTTP
//! listener on the loopback interface (`http://localhost:8000/completeLogin`
//! by default).
//!
//! # Cache Tiers
//!
//! [`AuthCoordinator::authenticate`] looks at the age of the cached record:
//!
//! | age (s)       | action                                          |
//! |---------------|-------------------------------------------------|
//! | < 2700        | reuse as-is                                     |
//! | 2700 – 2999   | validate against Minecraft Services, then touch |
//! | ≥ 3000        | refresh with the Microsoft refresh token        |
//!
//! A failed validation falls back to a refresh, a failed refresh to the
//! interactive login.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use qmc_auth::{
//!     AuthConfig, AuthCoordinator, DelegationChainClient, FileCredentialStore, LoginPresenter,
//! };
//!
//! struct PrintUrl;
//!
//! #[async_trait::async_trait]
//! impl LoginPresenter for PrintUrl {
//!     async fn present(&self, url: &url::Url) -> anyhow::Result<()> {
//!         println!("Open this page to log in: {url}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let store = FileCredentialStore::new(qmc_auth::config::default_data_dir()?).await?;
//!     let client = DelegationChainClient::new(config)?;
//!
//!     let coordinator = AuthCoordinator::new(client, Arc::new(store), Arc::new(PrintUrl));
//!     let authenticated = coordinator.authenticate().await?;
//!     println!("Logged in as: {}", authenticated.credential.display_name);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Freshness decisions
//!
//! The policy is a pure function and can be used on its own:
//!
//! ```
//! use qmc_auth::{FreshnessPolicy, Tier};
//!
//! let policy = FreshnessPolicy::default();
//! assert_eq!(policy.decide(10_000, 10_000 - 2800, true), Tier::Validate);
//! assert_eq!(policy.decide(10_000, 10_000 - 4000, false), Tier::Reauth);
//! ```
//!
//! # Token Storage
//!
//! [`CredentialStore`] has an in-memory implementation for tests:
//!
//! ```
//! use qmc_auth::{Credential, CredentialStore, MemoryCredentialStore};
//!
//! # async fn example() -> qmc_auth::Result<()> {
//! let store = MemoryCredentialStore::new();
//! # let credential = Credential {
//! #     subject_id: "uuid".to_string(),
//! #     display_name: "Player".to_string(),
//! #     access_token: "mc".to_string(),
//! #     refresh_token: None,
//! #     cache_timestamp: 0,
//! #     profile: Default::default(),
//! # };
//! store.save(&credential).await?;
//!
//! if let Some(credential) = store.load().await {
//!     println!("Loaded credential for: {}", credential.display_name);
//! }
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! # Important Notes
//!
//! - The default client id belongs to the QuickMC Azure app registration;
//!   override it with `QUICKMC_CLIENT_ID` for your own app
//! - Tokens are never logged; `QUICKMC_DEBUG_OAUTH=1` logs hop responses
//!   with every token redacted
//! - The cache file is plain JSON (`login_data.json`) with `0600` permissions

pub mod callback;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod errors;
pub mod file_store;
pub mod freshness;
pub mod models;
pub mod pkce;
pub mod store;

// Re-export main types
pub use callback::{CallbackHandle, CallbackParams, LoopbackCallbackListener};
pub use client::DelegationChainClient;
pub use config::{AuthConfig, Endpoints};
pub use coordinator::{AuthCoordinator, AuthState, Authenticated, LoginPresenter};
pub use credential::Credential;
pub use errors::{AuthError, ErrorKind, Hop, Result, XstsError};
pub use file_store::FileCredentialStore;
pub use freshness::{FreshnessPolicy, Tier};
pub use store::{CredentialStore, MemoryCredentialStore};
