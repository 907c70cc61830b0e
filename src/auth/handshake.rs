//! Handshake-secret derivation and cache
//!
//! A handshake secret authorizes one out-of-band device command (for
//! example a remote wipe). It is a SHA-512 digest of the account's
//! long-lived token concatenated with a caller-supplied nonce, so the
//! backend can compute the same value independently and neither side
//! ever transmits the underlying token on this channel.

use sha2::{Digest, Sha512};
use std::sync::Arc;
use std::sync::Mutex;

use crate::auth::tokens::AccountStore;
use crate::auth::AuthError;

/// One cached handshake secret. `expiration_millis` is recorded but
/// not enforced by this layer.
#[derive(Debug, Clone)]
pub struct HandshakeTokenItem {
    pub id: i64,
    pub secret: String,
    pub method: String,
    pub expiration_millis: i64,
}

/// Keyed record store for handshake secrets.
pub trait HandshakeSecretStore: Send + Sync {
    fn insert(&self, secret: &str, method: &str) -> i64;
    fn query(&self, secret: &str, method: &str) -> Option<HandshakeTokenItem>;
    fn delete_by_method(&self, method: &str) -> usize;
}

/// In-process store.
#[derive(Default)]
pub struct MemoryHandshakeStore {
    inner: Mutex<MemoryHandshakeInner>,
}

#[derive(Default)]
struct MemoryHandshakeInner {
    next_id: i64,
    items: Vec<HandshakeTokenItem>,
}

impl MemoryHandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HandshakeSecretStore for MemoryHandshakeStore {
    fn insert(&self, secret: &str, method: &str) -> i64 {
        let mut inner = self.inner.lock().expect("handshake store lock");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.push(HandshakeTokenItem {
            id,
            secret: secret.to_string(),
            method: method.to_string(),
            expiration_millis: 0,
        });
        id
    }

    fn query(&self, secret: &str, method: &str) -> Option<HandshakeTokenItem> {
        self.inner
            .lock()
            .expect("handshake store lock")
            .items
            .iter()
            .find(|item| item.secret == secret && item.method == method)
            .cloned()
    }

    fn delete_by_method(&self, method: &str) -> usize {
        let mut inner = self.inner.lock().expect("handshake store lock");
        let before = inner.items.len();
        inner.items.retain(|item| item.method != method);
        before - inner.items.len()
    }
}

/// Derives, caches, and purges per-command handshake secrets.
pub struct HandshakeTokenManager {
    accounts: Arc<dyn AccountStore>,
    store: Arc<dyn HandshakeSecretStore>,
}

impl HandshakeTokenManager {
    pub fn new(accounts: Arc<dyn AccountStore>, store: Arc<dyn HandshakeSecretStore>) -> Self {
        Self { accounts, store }
    }

    /// Derive `SHA-512(long_lived_token + nonce)` and cache it for
    /// `method`. Returns the derived secret. The long-lived token is
    /// never logged and never leaves this function.
    pub fn generate(&self, nonce: &str, method: &str) -> Result<String, AuthError> {
        let account = self
            .accounts
            .account()
            .ok_or(AuthError::NoAccountConfigured)?;
        let key = account
            .refresh_token
            .ok_or(AuthError::NoAccountConfigured)?;

        let secret = digest_sha512(&format!("{key}{nonce}"));
        self.store.insert(&secret, method);
        tracing::debug!("Cached handshake secret for command {method}");
        Ok(secret)
    }

    /// Exact-match lookup on `(secret, method)`.
    pub fn lookup(&self, secret: &str, method: &str) -> Option<HandshakeTokenItem> {
        self.store.query(secret, method)
    }

    /// Delete every cached secret for `method`.
    pub fn purge(&self, method: &str) -> usize {
        let removed = self.store.delete_by_method(method);
        if removed > 0 {
            tracing::debug!("Purged {removed} handshake secret(s) for command {method}");
        }
        removed
    }
}

fn digest_sha512(input: &str) -> String {
    let digest = Sha512::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
