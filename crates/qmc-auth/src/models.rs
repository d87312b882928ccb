use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Microsoft OAuth token response (from both code and refresh_token grants)
#[derive(Clone, Deserialize)]
pub struct MsTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Microsoft OAuth error body
#[derive(Debug, Clone, Deserialize)]
pub struct MsErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Xbox Live user.authenticate request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthRequest {
    pub properties: XblAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

/// Response shape shared by user.authenticate and xsts/authorize
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    pub display_claims: XblDisplayClaims,
    #[serde(default)]
    pub not_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblDisplayClaims {
    pub xui: Vec<XblUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblUserInfo {
    pub uhs: String,
}

/// XSTS authorize request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthRequest {
    pub properties: XstsAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

/// XSTS error response
#[derive(Debug, Clone, Deserialize)]
pub struct XstsErrorResponse {
    #[serde(rename = "XErr")]
    pub xerr: u64,
    #[serde(default, rename = "Message")]
    pub message: Option<String>,
}

/// Minecraft login_with_xbox request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McLoginRequest {
    pub identity_token: String,
}

/// Minecraft login_with_xbox response
///
/// `access_token` stays optional here: its absence is the signal that the
/// app registration is not permitted, which the client reports separately.
#[derive(Clone, Deserialize)]
pub struct McLoginResponse {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Minecraft profile response
///
/// Only `id` and `name` are interpreted; skins, capes and anything else are
/// kept untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McProfileResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hop (a) output
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Hop (b) output
pub struct NetworkIdentity {
    pub token: String,
    pub user_hash: String,
}

/// Hop (c) output
pub struct SecureSessionToken {
    pub token: String,
}

/// Hop (d) output
pub struct GameAccessToken {
    pub token: String,
}

/// Display adaptor that never prints a whole secret
///
/// Shows the first four characters and the length, e.g. `eyJ0…(1432 chars)`.
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.chars().count();
        if len <= 8 {
            return write!(f, "…({len} chars)");
        }
        let head: String = self.0.chars().take(4).collect();
        write!(f, "{head}…({len} chars)")
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkIdentity")
            .field("token", &Redacted(&self.token))
            .field("user_hash", &self.user_hash)
            .finish()
    }
}

impl fmt::Debug for SecureSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSessionToken")
            .field("token", &Redacted(&self.token))
            .finish()
    }
}

impl fmt::Debug for GameAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameAccessToken")
            .field("token", &Redacted(&self.token))
            .finish()
    }
}

impl fmt::Debug for MsTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsTokenResponse")
            .field("access_token", &Redacted(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(Redacted),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

impl fmt::Debug for McLoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McLoginResponse")
            .field("username", &self.username)
            .field("access_token", &self.access_token.as_deref().map(Redacted))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &Redacted(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(Redacted),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_hides_token() {
        let token = "eyJhbGciOiJIUzI1NiJ9.secret-payload";
        let shown = Redacted(token).to_string();
        assert!(shown.starts_with("eyJh"));
        assert!(!shown.contains("secret-payload"));

        let pair = TokenPair {
            access_token: token.to_string(),
            refresh_token: Some("M.R3_BAY.refresh-secret".to_string()),
        };
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret-payload"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn test_profile_keeps_unknown_fields() {
        let body = r#"{"id":"abc","name":"Steve","skins":[{"id":"s1"}],"capes":[],"profileActions":{}}"#;
        let profile: McProfileResponse = serde_json::from_str(body).unwrap();
        assert_eq!(profile.id.as_deref(), Some("abc"));
        assert_eq!(profile.name.as_deref(), Some("Steve"));
        let keys: Vec<&str> = profile.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, ["skins", "capes", "profileActions"]);
    }

    #[test]
    fn test_login_response_without_token() {
        let body = r#"{"username":"00000000-0000","roles":[]}"#;
        let login: McLoginResponse = serde_json::from_str(body).unwrap();
        assert!(login.access_token.is_none());
    }
}
