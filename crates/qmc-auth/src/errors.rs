use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The network exchange an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Microsoft identity platform token endpoint (code or refresh grant)
    MsToken,
    /// Xbox Live user.authenticate
    XboxLive,
    /// Xbox Live secure token service
    Xsts,
    /// Minecraft Services login_with_xbox
    GameLogin,
    /// Minecraft profile fetch
    Profile,
    /// Liveness probe of a cached access token
    Validate,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MsToken => "Microsoft token exchange",
            Self::XboxLive => "Xbox Live authentication",
            Self::Xsts => "XSTS authorization",
            Self::GameLogin => "Minecraft Services login",
            Self::Profile => "Minecraft profile fetch",
            Self::Validate => "token validation",
        };
        f.write_str(name)
    }
}

/// Coarse classification used by callers to pick a fallback or a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientNetwork,
    InvalidOrExpiredToken,
    EntitlementDenied,
    AppConfiguration,
    CallbackTimeout,
    CacheCorrupt,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Errors that end the attempt instead of falling through to the next tier
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::EntitlementDenied | Self::AppConfiguration | Self::CallbackTimeout | Self::Cancelled
        )
    }
}

/// Authentication error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{hop} failed: {source}")]
    Network {
        hop: Hop,
        #[source]
        source: reqwest::Error,
    },

    #[error("{hop} returned HTTP {status}: {body_snippet}")]
    Http {
        hop: Hop,
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("{hop}: invalid_grant - the refresh token or authorization code is expired or revoked")]
    InvalidGrant { hop: Hop },

    #[error("{hop}: the cached access token was rejected")]
    TokenRejected { hop: Hop },

    #[error("{hop} returned an unusable response: {reason}")]
    InvalidResponse { hop: Hop, reason: String },

    #[error("Xbox Live authentication failed after retry")]
    XblBadRequest,

    #[error("XSTS authorization denied: {0}")]
    XstsDenied(#[from] XstsError),

    #[error(
        "Minecraft Services refused to issue an access token. The Azure app registration is not \
         permitted to use the Minecraft API: register the redirect URI on the app, make sure the \
         XboxLive.signin scope is allowed, and request Minecraft API access for the client id"
    )]
    AppNotPermitted,

    #[error("This Microsoft account does not own Minecraft: Java Edition or has not created a profile yet")]
    GameNotOwned,

    #[error("No login callback received within {0:?}; start the login again")]
    CallbackTimeout(Duration),

    #[error("User cancelled the authentication flow")]
    UserCancelled,

    #[error("Invalid redirect callback or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Missing refresh token - cannot refresh credential")]
    MissingRefreshToken,

    #[error("Cached credential is unreadable: {0}")]
    CacheCorrupt(String),

    #[error("Could not bind login callback listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not open the login page: {0}")]
    Presenter(#[source] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to acquire credential store lock")]
    LockTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Wrap a transport error with the hop it happened on
    pub(crate) fn network(hop: Hop, source: reqwest::Error) -> Self {
        Self::Network { hop, source }
    }

    /// The hop an error originated from, if it came from the network
    pub fn hop(&self) -> Option<Hop> {
        match self {
            Self::Network { hop, .. }
            | Self::Http { hop, .. }
            | Self::InvalidGrant { hop }
            | Self::TokenRejected { hop }
            | Self::InvalidResponse { hop, .. } => Some(*hop),
            Self::XblBadRequest => Some(Hop::XboxLive),
            Self::XstsDenied(_) => Some(Hop::Xsts),
            Self::AppNotPermitted => Some(Hop::GameLogin),
            Self::GameNotOwned => Some(Hop::Profile),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::TransientNetwork,
            Self::Http { status, .. } if status.is_server_error() => ErrorKind::TransientNetwork,
            Self::Http { status, .. } if *status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                ErrorKind::TransientNetwork
            }
            Self::InvalidGrant { .. } | Self::TokenRejected { .. } | Self::MissingRefreshToken => {
                ErrorKind::InvalidOrExpiredToken
            }
            Self::XstsDenied(_) | Self::GameNotOwned => ErrorKind::EntitlementDenied,
            Self::AppNotPermitted | Self::Config(_) => ErrorKind::AppConfiguration,
            Self::CallbackTimeout(_) => ErrorKind::CallbackTimeout,
            Self::CacheCorrupt(_) => ErrorKind::CacheCorrupt,
            Self::UserCancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }
}

/// XSTS-specific error codes from XErr field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XstsError {
    #[error("Account doesn't have an Xbox account; sign in once at xbox.com to create one (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("Adult verification required on the Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("Child account must be added to a Microsoft Family by an adult (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("Unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsError {
    /// Parse XErr code from XSTS response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
