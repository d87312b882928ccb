use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::errors::{AuthError, Result};

/// Well-known production endpoints, one per hop
pub mod endpoints {
    pub const MS_AUTHORIZE: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";
    pub const MS_TOKEN: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const MC_LOGIN: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
    pub const MC_PROFILE: &str = "https://api.minecraftservices.com/minecraft/profile";
}

/// Azure application registered for QuickMC
pub const DEFAULT_CLIENT_ID: &str = "35292a04-c714-4fac-92e0-82c3ea360278";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/completeLogin";

/// OAuth scope required for the Xbox Live chain and a refresh token
pub const SCOPE: &str = "XboxLive.signin offline_access";

/// Relying parties
pub const RP_XBOXLIVE_AUTH: &str = "http://auth.xboxlive.com";
pub const RP_MINECRAFT: &str = "rp://api.minecraftservices.com/";

/// Environment overrides
pub const ENV_CLIENT_ID: &str = "QUICKMC_CLIENT_ID";
pub const ENV_REDIRECT_URI: &str = "QUICKMC_REDIRECT_URI";
pub const ENV_DEBUG_OAUTH: &str = "QUICKMC_DEBUG_OAUTH";
pub const ENV_DATA_DIR: &str = "QUICKMC_DATA_DIR";

/// Name of the cached credential record inside the data directory
pub const LOGIN_DATA_FILE: &str = "login_data.json";

/// Endpoint table used by the delegation chain client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
    pub xbl_authenticate: Url,
    pub xsts_authorize: Url,
    pub mc_login: Url,
    pub mc_profile: Url,
}

impl Endpoints {
    /// Point every hop at `base`, keeping each production path
    ///
    /// Used to aim the client at a local mock server.
    pub fn with_base(base: &Url) -> Result<Self> {
        Ok(Self {
            authorize: base.join("/consumers/oauth2/v2.0/authorize")?,
            token: base.join("/consumers/oauth2/v2.0/token")?,
            xbl_authenticate: base.join("/user/authenticate")?,
            xsts_authorize: base.join("/xsts/authorize")?,
            mc_login: base.join("/authentication/login_with_xbox")?,
            mc_profile: base.join("/minecraft/profile")?,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        let parse = |s: &str| Url::parse(s).expect("valid endpoint URL");
        Self {
            authorize: parse(endpoints::MS_AUTHORIZE),
            token: parse(endpoints::MS_TOKEN),
            xbl_authenticate: parse(endpoints::XBL_AUTHENTICATE),
            xsts_authorize: parse(endpoints::XSTS_AUTHORIZE),
            mc_login: parse(endpoints::MC_LOGIN),
            mc_profile: parse(endpoints::MC_PROFILE),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Retry policy for transient failures on the validate and refresh paths
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Configuration for the authentication core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Azure application (client) id
    pub client_id: String,

    /// OAuth redirect URI; also decides where the loopback listener binds
    pub redirect_uri: Url,

    pub endpoints: Endpoints,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// How long to wait for the browser to hit the redirect URI
    pub callback_timeout: Duration,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// Retry policy
    pub retry: RetryPolicy,

    /// Log every intermediate hop response (tokens redacted)
    pub debug_hops: bool,
}

impl AuthConfig {
    /// Defaults with `QUICKMC_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(client_id) = lookup(ENV_CLIENT_ID).filter(|v| !v.trim().is_empty()) {
            config.client_id = client_id.trim().to_string();
        }

        if let Some(redirect) = lookup(ENV_REDIRECT_URI).filter(|v| !v.trim().is_empty()) {
            config.redirect_uri = Url::parse(redirect.trim()).map_err(|e| {
                AuthError::Config(format!("{ENV_REDIRECT_URI} is not a valid URL: {e}"))
            })?;
        }

        if let Some(flag) = lookup(ENV_DEBUG_OAUTH) {
            config.debug_hops = parse_flag(&flag);
        }

        // Fail early rather than after the browser is already open
        config.callback_addr()?;

        Ok(config)
    }

    /// Loopback socket address derived from the redirect URI
    pub fn callback_addr(&self) -> Result<SocketAddr> {
        if self.redirect_uri.scheme() != "http" {
            return Err(AuthError::Config(format!(
                "redirect URI must use http on the loopback interface, got {}",
                self.redirect_uri
            )));
        }

        let ip = match self.redirect_uri.host_str() {
            Some("localhost") => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some(host) => host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .map_err(|_| {
                    AuthError::Config(format!("redirect host {host} is not a loopback address"))
                })?,
            None => return Err(AuthError::Config("redirect URI has no host".to_string())),
        };

        if !ip.is_loopback() {
            return Err(AuthError::Config(format!(
                "redirect host {ip} is not a loopback address"
            )));
        }

        let port = self.redirect_uri.port_or_known_default().unwrap_or(80);
        Ok(SocketAddr::new(ip, port))
    }

    /// Path the loopback listener serves the callback on
    pub fn callback_path(&self) -> &str {
        self.redirect_uri.path()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: Url::parse(DEFAULT_REDIRECT_URI).expect("valid redirect URI"),
            endpoints: Endpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            callback_timeout: Duration::from_secs(180),
            user_agent: Some("quickmc".to_string()),
            retry: RetryPolicy::default(),
            debug_hops: false,
        }
    }
}

/// Data directory holding the credential cache
///
/// `QUICKMC_DATA_DIR` wins over the platform default.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let project_dirs = directories::ProjectDirs::from("", "", "quickmc")
        .ok_or_else(|| AuthError::Config("Could not determine data directory".to_string()))?;

    Ok(project_dirs.data_dir().to_path_buf())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.callback_path(), "/completeLogin");
        assert_eq!(
            config.callback_addr().unwrap(),
            "127.0.0.1:8000".parse().unwrap()
        );
        assert!(!config.debug_hops);
    }

    #[test]
    fn test_env_overrides() {
        let config = AuthConfig::from_lookup(lookup(&[
            (ENV_CLIENT_ID, "my-app"),
            (ENV_REDIRECT_URI, "http://127.0.0.1:9123/cb"),
            (ENV_DEBUG_OAUTH, "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.client_id, "my-app");
        assert_eq!(config.callback_path(), "/cb");
        assert_eq!(
            config.callback_addr().unwrap(),
            "127.0.0.1:9123".parse().unwrap()
        );
        assert!(config.debug_hops);
    }

    #[test]
    fn test_rejects_non_loopback_redirect() {
        let result = AuthConfig::from_lookup(lookup(&[(
            ENV_REDIRECT_URI,
            "http://example.com:8000/completeLogin",
        )]));
        assert!(matches!(result, Err(AuthError::Config(_))));

        let result = AuthConfig::from_lookup(lookup(&[(ENV_REDIRECT_URI, "not a url")]));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_endpoints_with_base() {
        let base = Url::parse("http://127.0.0.1:4000").unwrap();
        let endpoints = Endpoints::with_base(&base).unwrap();
        assert_eq!(
            endpoints.mc_profile.as_str(),
            "http://127.0.0.1:4000/minecraft/profile"
        );
        assert_eq!(
            endpoints.token.as_str(),
            "http://127.0.0.1:4000/consumers/oauth2/v2.0/token"
        );
    }
}
