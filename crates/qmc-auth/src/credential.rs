use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Redacted;

/// The cached, playable identity
///
/// `access_token` and `cache_timestamp` are both required when decoding, so a
/// record missing either one fails to load and is treated as absent.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    /// Minecraft profile UUID without dashes
    pub subject_id: String,
    /// Player name
    pub display_name: String,
    /// Minecraft Services access token
    pub access_token: String,
    /// Microsoft refresh token; `None` forces a full login on expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch seconds of the last write of this record
    pub cache_timestamp: i64,
    /// Remaining profile fields (skins, capes, ...), carried as-is
    #[serde(default)]
    pub profile: Map<String, Value>,
}

impl Credential {
    /// Seconds since the record was written, relative to `now`
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.cache_timestamp)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Stamp the record as freshly written
    pub fn touch(&mut self, now: i64) {
        self.cache_timestamp = now;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("subject_id", &self.subject_id)
            .field("display_name", &self.display_name)
            .field("access_token", &Redacted(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(Redacted),
            )
            .field("cache_timestamp", &self.cache_timestamp)
            .field("profile_fields", &self.profile.len())
            .finish()
    }
}

/// Current time in epoch seconds
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}
