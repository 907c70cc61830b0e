//! Account, token, and handshake-secret management
//!
//! Owns the access/refresh token lifecycle against the Devlink token
//! endpoint and the cache of derived handshake secrets that authorize
//! out-of-band device commands.

pub mod handshake;
pub mod manager;
pub mod tokens;

pub use handshake::{
    HandshakeSecretStore, HandshakeTokenItem, HandshakeTokenManager, MemoryHandshakeStore,
};
pub use manager::TokenManager;
pub use tokens::{AccountRecord, AccountStore, MemoryAccountStore, TokenResponse};

use thiserror::Error;

use crate::api::transport::TransportError;

/// Failure taxonomy for authenticated operations.
///
/// Every failure is surfaced to the caller; nothing here terminates the
/// process. `Cancelled` means the operation was replaced by a newer one
/// on the same endpoint slot and its result was discarded.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Precondition failure: the operation needs an account and none exists.
    /// Reported before any network activity.
    #[error("no account configured")]
    NoAccountConfigured,

    /// The refresh/login call itself failed. Terminal for the current
    /// operation; never retried.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// The server rejected a freshly refreshed token. Not retried again.
    #[error("unauthorized after token refresh")]
    Unauthorized,

    /// Transport-level failure other than a recoverable 401.
    #[error(transparent)]
    Network(TransportError),

    /// A newer request for the same endpoint superseded this one.
    #[error("request superseded by a newer one for the same endpoint")]
    Cancelled,
}
