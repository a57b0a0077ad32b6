//! Token model and expiry bookkeeping

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Safety margin before the declared expiry at which a token is refreshed.
pub const REFRESH_SKEW_SECS: u64 = 60;

/// Source of the current unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// A usable access token plus the bookkeeping needed to renew it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token (OAuth 2.0) or `oauth_token` (OAuth 1.0a)
    pub value: String,
    /// Credential exchanged for the next access token
    pub refresh_token: String,
    /// OAuth 1.0a token secret; empty for OAuth 2.0
    pub secret: String,
    /// Lifetime declared at issuance, 0 when the server declared none
    pub expires_in: u64,
    /// Local unix time at which the refresh response was accepted
    pub issued_at: u64,
}

impl AccessToken {
    /// Whether the token is inside the refresh window at `now`.
    ///
    /// Tokens without a declared lifetime are only ever refreshed reactively.
    pub fn should_refresh(&self, now: u64) -> bool {
        if self.expires_in == 0 {
            return false;
        }
        now + REFRESH_SKEW_SECS >= self.issued_at.saturating_add(self.expires_in)
    }

    /// Unix time of the declared expiry, if any.
    pub fn expires_at(&self) -> Option<u64> {
        (self.expires_in > 0).then(|| self.issued_at.saturating_add(self.expires_in))
    }
}

/// The persisted form of an [`AccessToken`].
///
/// Every field is required; the store never hands out a partial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub token_secret: String,
    pub expires_in: u64,
    pub issued_at: u64,
}

impl From<&AccessToken> for PersistedTokenRecord {
    fn from(token: &AccessToken) -> Self {
        Self {
            access_token: token.value.clone(),
            refresh_token: token.refresh_token.clone(),
            token_secret: token.secret.clone(),
            expires_in: token.expires_in,
            issued_at: token.issued_at,
        }
    }
}

impl From<PersistedTokenRecord> for AccessToken {
    fn from(record: PersistedTokenRecord) -> Self {
        Self {
            value: record.access_token,
            refresh_token: record.refresh_token,
            secret: record.token_secret,
            expires_in: record.expires_in,
            issued_at: record.issued_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that only moves when told to.
    #[derive(Debug, Default)]
    pub struct ManualClock(AtomicU64);

    impl ManualClock {
        pub fn at(now: u64) -> Self {
            Self(AtomicU64::new(now))
        }

        pub fn set(&self, now: u64) {
            self.0.store(now, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(issued_at: u64, expires_in: u64) -> AccessToken {
        AccessToken {
            value: "access".to_string(),
            refresh_token: "refresh".to_string(),
            secret: String::new(),
            expires_in,
            issued_at,
        }
    }

    #[test]
    fn test_should_refresh_window() {
        let t = 1_700_000_000;
        let tok = token(t, 3600);
        assert!(!tok.should_refresh(t));
        assert!(!tok.should_refresh(t + 3500));
        assert!(!tok.should_refresh(t + 3539));
        assert!(tok.should_refresh(t + 3540));
        assert!(tok.should_refresh(t + 3541));
        assert!(tok.should_refresh(t + 10_000));
    }

    #[test]
    fn test_no_lifetime_never_expires() {
        let tok = token(0, 0);
        assert!(!tok.should_refresh(u64::MAX / 2));
        assert_eq!(tok.expires_at(), None);
    }

    #[test]
    fn test_record_conversion_keeps_fields() {
        let tok = AccessToken {
            value: "a".to_string(),
            refresh_token: "r".to_string(),
            secret: "s".to_string(),
            expires_in: 10800,
            issued_at: 42,
        };
        let record = PersistedTokenRecord::from(&tok);
        assert_eq!(record.token_secret, "s");
        assert_eq!(AccessToken::from(record), tok);
        assert_eq!(tok.expires_at(), Some(10842));
    }
}
