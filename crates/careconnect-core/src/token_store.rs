//! Bearer token persistence.
//!
//! The token and its absolute expiry (epoch seconds) live under two storage
//! keys that are always written and removed together.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::clock::Clock;
use crate::storage::KeyValueStore;

/// Storage key for the bearer token.
pub const TOKEN_KEY: &str = "care_connect_token";
/// Storage key for the token expiry (epoch seconds).
pub const TOKEN_EXPIRY_KEY: &str = "care_connect_token_expiry";

/// A stored bearer token with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    /// Expiry in seconds since the Unix epoch.
    pub expires_at: i64,
}

impl SessionToken {
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Returns true if more than `buffer` of lifetime remains at `now`.
    pub fn is_valid_at(&self, now: i64, buffer: Duration) -> bool {
        let buffer = i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX);
        self.expires_at.saturating_sub(now) > buffer
    }

    /// Remaining lifetime at `now`, or `None` once expired.
    pub fn remaining_at(&self, now: i64) -> Option<Duration> {
        let remaining = self.expires_at.saturating_sub(now);
        u64::try_from(remaining)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Reads and writes the session token pair.
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    /// Persists the token pair, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the storage write fails; nothing is written then.
    pub fn save(&self, token: &str, expires_at: i64) -> Result<()> {
        let expiry = expires_at.to_string();
        self.storage
            .set_many(&[(TOKEN_KEY, token), (TOKEN_EXPIRY_KEY, expiry.as_str())])
    }

    /// Returns the stored token, or `None` if either half is missing or the
    /// expiry is not an integer. Both halves come from one storage snapshot.
    pub fn read(&self) -> Option<SessionToken> {
        let values = match self.storage.get_many(&[TOKEN_KEY, TOKEN_EXPIRY_KEY]) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to read session storage");
                return None;
            }
        };
        let mut values = values.into_iter();
        let token = values.next().flatten()?;
        let expiry = values.next().flatten()?;
        if token.is_empty() {
            return None;
        }
        match expiry.trim().parse::<i64>() {
            Ok(expires_at) => Some(SessionToken { token, expires_at }),
            Err(_) => {
                warn!("Stored token expiry is not numeric; ignoring stored token");
                None
            }
        }
    }

    /// Removes both keys. Clearing an empty store is a no-op.
    ///
    /// # Errors
    /// Returns an error if the storage write fails.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_many(&[TOKEN_KEY, TOKEN_EXPIRY_KEY])
    }

    /// True iff a token is present and `expires_at - now > buffer`.
    pub fn is_valid(&self, buffer: Duration) -> bool {
        self.read()
            .is_some_and(|token| token.is_valid_at(self.now(), buffer))
    }

    /// Remaining lifetime of the stored token.
    pub fn expires_in(&self) -> Option<Duration> {
        self.read().and_then(|token| token.remaining_at(self.now()))
    }
}
