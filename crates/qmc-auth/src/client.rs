use std::fmt::Debug;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::{AuthConfig, RP_MINECRAFT, RP_XBOXLIVE_AUTH, SCOPE};
use crate::credential::{Credential, now_epoch};
use crate::errors::{AuthError, Hop, Result, XstsError};
use crate::models::*;
use crate::pkce::{self, AuthorizationRequest};

/// Runs the Microsoft → Xbox Live → XSTS → Minecraft Services chain
#[derive(Debug, Clone)]
pub struct DelegationChainClient {
    config: AuthConfig,
    http: Client,
}

impl DelegationChainClient {
    /// Create a new client
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("quickmc"))
            .build()
            .map_err(|e| AuthError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL plus the state/verifier bound to it
    #[instrument(skip(self))]
    pub fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        let state = pkce::generate_state()?;
        let verifier = pkce::generate_code_verifier()?;
        let challenge = pkce::generate_code_challenge(&verifier);

        let mut url = self.config.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_mode", "query")
            .append_pair("scope", SCOPE)
            .append_pair("state", &state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "select_account");

        debug!("Built authorize URL for client {}", self.config.client_id);
        Ok(AuthorizationRequest {
            url,
            state,
            verifier,
        })
    }

    /// Hop (a): exchange authorization code for Microsoft tokens
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenPair> {
        debug!("Exchanging authorization code for tokens");
        self.ms_token_request(&[
            ("client_id", self.config.client_id.as_str()),
            ("scope", SCOPE),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code_verifier", verifier),
        ])
        .await
    }

    /// Hop (a), refresh flavour: trade a refresh token for new Microsoft tokens
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_ms_token(&self, refresh_token: &str) -> Result<TokenPair> {
        debug!("Refreshing Microsoft access token");
        self.ms_token_request(&[
            ("client_id", self.config.client_id.as_str()),
            ("scope", SCOPE),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn ms_token_request(&self, form: &[(&str, &str)]) -> Result<TokenPair> {
        let response = self
            .http
            .post(self.config.endpoints.token.clone())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::MsToken, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(error) = serde_json::from_str::<MsErrorResponse>(&body)
                && error.error == "invalid_grant"
            {
                return Err(AuthError::InvalidGrant { hop: Hop::MsToken });
            }

            return Err(http_error(Hop::MsToken, status, &body));
        }

        let token_response: MsTokenResponse = decode(Hop::MsToken, response).await?;
        self.trace_hop(Hop::MsToken, &token_response);

        Ok(TokenPair {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
        })
    }

    /// Hop (b): authenticate with Xbox Live
    #[instrument(skip(self, ms_access_token))]
    pub async fn xbl_authenticate(&self, ms_access_token: &str) -> Result<NetworkIdentity> {
        debug!("Authenticating with Xbox Live");
        let response = self
            .send_xbl(format!("d={}", ms_access_token))
            .await?;

        // Tokens from the legacy live.com flow want the bare ticket
        let response = if response.status() == StatusCode::BAD_REQUEST {
            warn!("XBL authentication failed, retrying without 'd=' prefix");
            let retry_response = self.send_xbl(ms_access_token.to_string()).await?;
            if !retry_response.status().is_success() {
                return Err(AuthError::XblBadRequest);
            }
            retry_response
        } else {
            response
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(Hop::XboxLive, status, &body));
        }

        let xbl_response: XboxTokenResponse = decode(Hop::XboxLive, response).await?;
        let user_hash = first_user_hash(Hop::XboxLive, &xbl_response)?;

        let identity = NetworkIdentity {
            token: xbl_response.token,
            user_hash,
        };
        self.trace_hop(Hop::XboxLive, &identity);
        Ok(identity)
    }

    async fn send_xbl(&self, rps_ticket: String) -> Result<Response> {
        let request = XblAuthRequest {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket,
            },
            relying_party: RP_XBOXLIVE_AUTH.to_string(),
            token_type: "JWT".to_string(),
        };

        self.http
            .post(self.config.endpoints.xbl_authenticate.clone())
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::XboxLive, e))
    }

    /// Hop (c): authorize with XSTS for the Minecraft relying party
    #[instrument(skip(self, identity))]
    pub async fn xsts_authorize(&self, identity: &NetworkIdentity) -> Result<SecureSessionToken> {
        let request = XstsAuthRequest {
            properties: XstsAuthProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![identity.token.clone()],
            },
            relying_party: RP_MINECRAFT.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("Authorizing with XSTS");
        let response = self
            .http
            .post(self.config.endpoints.xsts_authorize.clone())
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::Xsts, e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<XstsErrorResponse>(&body) {
                Ok(error_response) => Err(XstsError::from_xerr(error_response.xerr).into()),
                Err(_) => Err(http_error(Hop::Xsts, StatusCode::UNAUTHORIZED, &body)),
            };
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(Hop::Xsts, status, &body));
        }

        let xsts_response: XboxTokenResponse = decode(Hop::Xsts, response).await?;
        let session = SecureSessionToken {
            token: xsts_response.token,
        };
        self.trace_hop(Hop::Xsts, &session);
        Ok(session)
    }

    /// Hop (d): log in to Minecraft Services with the user hash and XSTS token
    #[instrument(skip(self, user_hash, session))]
    pub async fn mc_login(
        &self,
        user_hash: &str,
        session: &SecureSessionToken,
    ) -> Result<GameAccessToken> {
        let request = McLoginRequest {
            identity_token: format!("XBL3.0 x={};{}", user_hash, session.token),
        };

        debug!("Logging in to Minecraft Services");
        let response = self
            .http
            .post(self.config.endpoints.mc_login.clone())
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::GameLogin, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::FORBIDDEN && body.contains("Invalid app registration") {
                return Err(AuthError::AppNotPermitted);
            }

            return Err(http_error(Hop::GameLogin, status, &body));
        }

        let login_response: McLoginResponse = decode(Hop::GameLogin, response).await?;
        self.trace_hop(Hop::GameLogin, &login_response);

        match login_response.access_token {
            Some(token) if !token.is_empty() => Ok(GameAccessToken { token }),
            _ => {
                warn!("Minecraft Services answered without an access_token");
                Err(AuthError::AppNotPermitted)
            }
        }
    }

    /// Hop (e): fetch the Minecraft profile
    #[instrument(skip(self, game_token))]
    pub async fn fetch_profile(&self, game_token: &GameAccessToken) -> Result<McProfileResponse> {
        debug!("Fetching Minecraft profile");
        let response = self
            .http
            .get(self.config.endpoints.mc_profile.clone())
            .bearer_auth(&game_token.token)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::Profile, e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(AuthError::GameNotOwned);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(Hop::Profile, status, &body));
        }

        let profile: McProfileResponse = decode(Hop::Profile, response).await?;
        self.trace_hop(Hop::Profile, &profile);

        if profile.error.as_deref() == Some("NOT_FOUND") {
            return Err(AuthError::GameNotOwned);
        }

        Ok(profile)
    }

    /// Hops (b) through (e), shared by the code and refresh paths
    async fn complete_chain(
        &self,
        ms_access_token: &str,
    ) -> Result<(GameAccessToken, McProfileResponse)> {
        let identity = self.xbl_authenticate(ms_access_token).await?;
        let session = self.xsts_authorize(&identity).await?;
        let game_token = self.mc_login(&identity.user_hash, &session).await?;
        let profile = self.fetch_profile(&game_token).await?;
        Ok((game_token, profile))
    }

    /// Complete login flow from authorization code to a playable credential
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_full(&self, code: &str, verifier: &str) -> Result<Credential> {
        debug!("Starting complete login flow");

        let tokens = self.exchange_code(code, verifier).await?;
        let (game_token, profile) = self.complete_chain(&tokens.access_token).await?;

        let subject_id = profile.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            AuthError::InvalidResponse {
                hop: Hop::Profile,
                reason: "profile has no id".to_string(),
            }
        })?;
        let display_name = profile.name.filter(|name| !name.is_empty()).ok_or_else(|| {
            AuthError::InvalidResponse {
                hop: Hop::Profile,
                reason: "profile has no name".to_string(),
            }
        })?;

        Ok(Credential {
            subject_id,
            display_name,
            access_token: game_token.token,
            refresh_token: tokens.refresh_token,
            cache_timestamp: now_epoch(),
            profile: profile.extra,
        })
    }

    /// Re-run the chain from the cached refresh token
    ///
    /// Profile fields missing from the fresh responses are taken from `prior`.
    #[instrument(skip(self, prior), fields(subject_id = %prior.subject_id))]
    pub async fn refresh(&self, prior: &Credential) -> Result<Credential> {
        debug!("Refreshing credential");

        let refresh_token = prior
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        let tokens = self.refresh_ms_token(refresh_token).await?;
        let (game_token, profile) = self.complete_chain(&tokens.access_token).await?;

        let subject_id = profile
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| prior.subject_id.clone());
        let display_name = profile
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| prior.display_name.clone());
        let extra = if profile.extra.is_empty() {
            prior.profile.clone()
        } else {
            profile.extra
        };

        Ok(Credential {
            subject_id,
            display_name,
            access_token: game_token.token,
            refresh_token: tokens.refresh_token.or_else(|| prior.refresh_token.clone()),
            cache_timestamp: now_epoch(),
            profile: extra,
        })
    }

    /// Cheap liveness probe of a cached Minecraft access token
    #[instrument(skip(self, access_token))]
    pub async fn validate_token(&self, access_token: &str) -> Result<()> {
        debug!("Validating cached access token");
        let response = self
            .http
            .get(self.config.endpoints.mc_profile.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::Validate, e))?;

        // Anything but success or a server-side hiccup means "not valid";
        // ownership is decided later by the refresh path's profile fetch
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            Err(http_error(Hop::Validate, status, &body))
        } else {
            debug!(%status, "Cached access token rejected");
            Err(AuthError::TokenRejected { hop: Hop::Validate })
        }
    }

    fn trace_hop(&self, hop: Hop, response: &impl Debug) {
        if self.config.debug_hops {
            debug!(%hop, "hop response: {:?}", response);
        }
    }
}

fn http_error(hop: Hop, status: StatusCode, body: &str) -> AuthError {
    AuthError::Http {
        hop,
        status,
        body_snippet: body.chars().take(200).collect(),
    }
}

async fn decode<T: DeserializeOwned>(hop: Hop, response: Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| AuthError::network(hop, e))?;
    serde_json::from_slice(&body).map_err(|e| AuthError::InvalidResponse {
        hop,
        reason: e.to_string(),
    })
}

fn first_user_hash(hop: Hop, response: &XboxTokenResponse) -> Result<String> {
    response
        .display_claims
        .xui
        .first()
        .map(|claim| claim.uhs.clone())
        .ok_or_else(|| AuthError::InvalidResponse {
            hop,
            reason: "missing XUI claims".to_string(),
        })
}
