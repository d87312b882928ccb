use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::callback::LoopbackCallbackListener;
use crate::client::DelegationChainClient;
use crate::credential::{Credential, now_epoch};
use crate::errors::{AuthError, ErrorKind, Result};
use crate::freshness::{FreshnessPolicy, Tier};
use crate::store::CredentialStore;

/// Shows the login page to the user
///
/// Implementations open a browser or an embedded view and return as soon as
/// the page is on screen; the code comes back through the loopback listener.
#[async_trait::async_trait]
pub trait LoginPresenter: Send + Sync {
    async fn present(&self, url: &Url) -> anyhow::Result<()>;
}

/// Steps of one authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Init,
    Reused,
    Validating,
    Refreshing,
    AwaitingCallback,
    Exchanging,
    Done,
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful [`AuthCoordinator::authenticate`]
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub credential: Credential,
    /// States visited, from `Init` to `Done`
    pub transitions: Vec<AuthState>,
}

/// Drives store, freshness policy, delegation chain and loopback listener
pub struct AuthCoordinator {
    client: DelegationChainClient,
    store: Arc<dyn CredentialStore>,
    presenter: Arc<dyn LoginPresenter>,
    policy: FreshnessPolicy,
}

impl AuthCoordinator {
    pub fn new(
        client: DelegationChainClient,
        store: Arc<dyn CredentialStore>,
        presenter: Arc<dyn LoginPresenter>,
    ) -> Self {
        Self {
            client,
            store,
            presenter,
            policy: FreshnessPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Produce a playable credential, doing as little network work as the
    /// cache allows
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<Authenticated> {
        let mut transitions = vec![AuthState::Init];

        match self.run(&mut transitions).await {
            Ok(credential) => {
                enter(&mut transitions, AuthState::Done);
                info!("Authenticated as {}", credential.display_name);
                Ok(Authenticated {
                    credential,
                    transitions,
                })
            }
            Err(e) => {
                enter(&mut transitions, AuthState::Failed);
                error!(kind = ?e.kind(), hop = ?e.hop(), "Authentication failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run(&self, transitions: &mut Vec<AuthState>) -> Result<Credential> {
        let Some(cached) = self.store.load().await else {
            info!("No cached login data, performing complete login");
            return self.complete_login(transitions).await;
        };

        let mut tier = self.policy.decide(
            now_epoch(),
            cached.cache_timestamp,
            cached.has_refresh_token(),
        );
        debug!(?tier, age = cached.age(now_epoch()), "Cached login data found");

        if tier == Tier::Reuse {
            enter(transitions, AuthState::Reused);
            info!("Using fresh cached login data");
            return Ok(cached);
        }

        if tier == Tier::Validate {
            enter(transitions, AuthState::Validating);
            let validated = self
                .with_retry(|| self.client.validate_token(&cached.access_token))
                .await;
            match validated {
                Ok(()) => {
                    info!("Cached token is still valid");
                    let mut credential = cached;
                    credential.touch(now_epoch());
                    self.persist(&credential).await;
                    return Ok(credential);
                }
                Err(e) if e.kind().is_terminal() => return Err(e),
                Err(e) => {
                    warn!("Cached token validation failed: {}", e);
                    tier = self.policy.after_validation_failure(cached.has_refresh_token());
                }
            }
        }

        if tier == Tier::Refresh {
            enter(transitions, AuthState::Refreshing);
            let refreshed = self.with_retry(|| self.client.refresh(&cached)).await;
            match refreshed {
                Ok(mut credential) => {
                    info!("Token refresh successful");
                    credential.touch(now_epoch());
                    self.persist(&credential).await;
                    return Ok(credential);
                }
                Err(e) if e.kind().is_terminal() => return Err(e),
                Err(e) => warn!("Token refresh failed: {}", e),
            }
        }

        self.complete_login(transitions).await
    }

    /// Interactive login through the browser and the loopback listener
    async fn complete_login(&self, transitions: &mut Vec<AuthState>) -> Result<Credential> {
        let config = self.client.config();
        let request = self.client.begin_authorization()?;

        let handle = LoopbackCallbackListener::from_config(config)?.start().await?;
        enter(transitions, AuthState::AwaitingCallback);

        info!("Opening login page...");
        self.presenter
            .present(&request.url)
            .await
            .map_err(AuthError::Presenter)?;

        let params = handle
            .wait(config.callback_timeout)
            .await
            .ok_or(AuthError::CallbackTimeout(config.callback_timeout))?;
        let code = params.into_code(&request.state)?;

        enter(transitions, AuthState::Exchanging);
        let mut credential = self.client.exchange_full(&code, &request.verifier).await?;
        credential.touch(now_epoch());
        self.persist(&credential).await;

        Ok(credential)
    }

    /// Save, logging instead of failing: the credential is usable either way
    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential).await {
            warn!("Failed to save login data: {}", e);
        }
    }

    /// Run `op`, retrying transient network failures per the retry policy
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = &self.client.config().retry;
        let mut attempt = 0;

        loop {
            match op().await {
                Err(e) if e.kind() == ErrorKind::TransientNetwork && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.base_delay * attempt;
                    warn!("Transient failure ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

fn enter(transitions: &mut Vec<AuthState>, state: AuthState) {
    debug!(from = ?transitions.last(), to = %state, "auth state transition");
    transitions.push(state);
}
