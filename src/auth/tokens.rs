//! Token storage and expiry bookkeeping

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Body of a successful call to the token endpoint.
///
/// An absent `refresh_token` means "keep the one you have".
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Wall-clock now in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The mutable credential fields for the configured account.
///
/// `expires_at_millis` is the absolute instant after which `access_token`
/// must be treated as expired; it is always written together with the
/// access token from a single token response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at_millis: Option<i64>,
}

impl AccountRecord {
    /// Whether the cached access token is present and not yet expired.
    pub fn token_is_fresh(&self, now_millis: i64) -> bool {
        match (&self.access_token, self.expires_at_millis) {
            (Some(_), Some(expires_at)) => now_millis <= expires_at,
            _ => false,
        }
    }

    /// Apply a token response: access token, expiry, and the refresh
    /// token only when the response carried one. One response, one write.
    pub fn apply(&mut self, response: &TokenResponse, now_millis: i64) {
        self.access_token = Some(response.access_token.clone());
        if let Some(refresh) = &response.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        self.expires_at_millis = Some(now_millis + response.expires_in as i64 * 1000);
    }
}

/// Durable holder for the account's credentials.
///
/// One account per store. A token response is applied in a single call
/// so the access token and its expiry never disagree.
pub trait AccountStore: Send + Sync {
    /// Snapshot of the configured account, or `None` when no account exists.
    fn account(&self) -> Option<AccountRecord>;

    /// Apply a token response, creating the account on first login.
    fn apply_token_response(&self, response: &TokenResponse, now_millis: i64);

    /// Drop the cached access token so it can never be reused. The
    /// refresh token and expiry are left in place.
    fn invalidate_access_token(&self);

    /// Remove the account and all credentials.
    fn clear(&self);
}

/// In-memory store, for tests and embedding without persistence.
#[derive(Default)]
pub struct MemoryAccountStore {
    inner: Mutex<Option<AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(record: AccountRecord) -> Self {
        Self {
            inner: Mutex::new(Some(record)),
        }
    }
}

impl AccountStore for MemoryAccountStore {
    fn account(&self) -> Option<AccountRecord> {
        self.inner.lock().expect("account store lock").clone()
    }

    fn apply_token_response(&self, response: &TokenResponse, now_millis: i64) {
        let mut guard = self.inner.lock().expect("account store lock");
        guard
            .get_or_insert_with(AccountRecord::default)
            .apply(response, now_millis);
    }

    fn invalidate_access_token(&self) {
        let mut guard = self.inner.lock().expect("account store lock");
        if let Some(record) = guard.as_mut() {
            record.access_token = None;
        }
    }

    fn clear(&self) {
        *self.inner.lock().expect("account store lock") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            expires_in,
        }
    }

    #[test]
    fn fresh_requires_token_and_future_expiry() {
        let mut record = AccountRecord::default();
        assert!(!record.token_is_fresh(1_000));

        record.access_token = Some("A1".into());
        record.expires_at_millis = Some(2_000);
        assert!(record.token_is_fresh(1_000));
        assert!(record.token_is_fresh(2_000));
        assert!(!record.token_is_fresh(2_001));
    }

    #[test]
    fn apply_computes_absolute_expiry() {
        let mut record = AccountRecord::default();
        record.apply(&response("A2", Some("R2"), 3600), 10_000);
        assert_eq!(record.access_token.as_deref(), Some("A2"));
        assert_eq!(record.refresh_token.as_deref(), Some("R2"));
        assert_eq!(record.expires_at_millis, Some(10_000 + 3_600_000));
    }

    #[test]
    fn apply_keeps_refresh_token_when_response_omits_it() {
        let mut record = AccountRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            expires_at_millis: Some(0),
        };
        record.apply(&response("A2", None, 60), 1_000);
        assert_eq!(record.refresh_token.as_deref(), Some("R1"));
        assert_eq!(record.access_token.as_deref(), Some("A2"));
    }

    #[test]
    fn invalidate_only_drops_access_token() {
        let store = MemoryAccountStore::with_account(AccountRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            expires_at_millis: Some(99),
        });
        store.invalidate_access_token();
        let record = store.account().unwrap();
        assert!(record.access_token.is_none());
        assert_eq!(record.refresh_token.as_deref(), Some("R1"));
        assert_eq!(record.expires_at_millis, Some(99));
    }

    #[test]
    fn apply_creates_account_on_first_login() {
        let store = MemoryAccountStore::new();
        assert!(store.account().is_none());
        store.apply_token_response(&response("A1", Some("R1"), 60), 0);
        assert!(store.account().unwrap().token_is_fresh(30_000));
        store.clear();
        assert!(store.account().is_none());
    }
}
