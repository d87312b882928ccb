//! Age-based decision on how much work a cached credential needs.
//!
//! Minecraft Services tokens are issued with a lifetime of roughly an hour.
//! Anything younger than 45 minutes is trusted as-is, the next five minutes
//! get a liveness probe, and older records go straight to a refresh.

/// Records younger than this are reused without any network call
pub const REUSE_MAX_AGE: i64 = 2700;

/// Records younger than this (and at least [`REUSE_MAX_AGE`]) are validated
pub const VALIDATE_MAX_AGE: i64 = 3000;

/// What to do with the cached credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Reuse,
    Validate,
    Refresh,
    Reauth,
}

/// Pure mapping from cache age to a [`Tier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub reuse_max_age: i64,
    pub validate_max_age: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            reuse_max_age: REUSE_MAX_AGE,
            validate_max_age: VALIDATE_MAX_AGE,
        }
    }
}

impl FreshnessPolicy {
    /// Decide the tier for a record written at `cache_timestamp`
    ///
    /// A timestamp in the future yields a negative age and is reused.
    pub fn decide(&self, now: i64, cache_timestamp: i64, has_refresh_token: bool) -> Tier {
        let age = now.saturating_sub(cache_timestamp);

        if age < self.reuse_max_age {
            Tier::Reuse
        } else if age < self.validate_max_age {
            Tier::Validate
        } else {
            self.after_validation_failure(has_refresh_token)
        }
    }

    /// Tier to fall back to once validation has failed or been skipped
    pub fn after_validation_failure(&self, has_refresh_token: bool) -> Tier {
        if has_refresh_token {
            Tier::Refresh
        } else {
            Tier::Reauth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn decide(age: i64, has_refresh_token: bool) -> Tier {
        FreshnessPolicy::default().decide(NOW, NOW - age, has_refresh_token)
    }

    #[test]
    fn test_boundaries_with_refresh_token() {
        assert_eq!(decide(0, true), Tier::Reuse);
        assert_eq!(decide(2699, true), Tier::Reuse);
        assert_eq!(decide(2700, true), Tier::Validate);
        assert_eq!(decide(2999, true), Tier::Validate);
        assert_eq!(decide(3000, true), Tier::Refresh);
        assert_eq!(decide(86_400, true), Tier::Refresh);
    }

    #[test]
    fn test_boundaries_without_refresh_token() {
        assert_eq!(decide(2699, false), Tier::Reuse);
        assert_eq!(decide(2700, false), Tier::Validate);
        assert_eq!(decide(2999, false), Tier::Validate);
        assert_eq!(decide(3000, false), Tier::Reauth);
    }

    #[test]
    fn test_every_age_lands_in_its_band() {
        let policy = FreshnessPolicy::default();
        for age in (0..4000).step_by(7).chain([2699, 2700, 2999, 3000]) {
            let tier = policy.decide(NOW, NOW - age, true);
            let expected = match age {
                a if a < 2700 => Tier::Reuse,
                a if a < 3000 => Tier::Validate,
                _ => Tier::Refresh,
            };
            assert_eq!(tier, expected, "age {age}");
        }
    }

    #[test]
    fn test_future_timestamp_is_reused() {
        assert_eq!(decide(-120, false), Tier::Reuse);
    }

    #[test]
    fn test_fallbacks() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.after_validation_failure(true), Tier::Refresh);
        assert_eq!(policy.after_validation_failure(false), Tier::Reauth);
    }
}
