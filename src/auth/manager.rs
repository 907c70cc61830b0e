//! Access-token acquisition
//!
//! Decides whether the cached access token is still usable and, when it
//! is not, performs one refresh call and writes the result back to the
//! account store. The refresh path is single-flight: concurrent callers
//! that find the token expired queue behind one refresh and all pick up
//! its outcome from the store, rather than racing their own calls.

use std::sync::Arc;

use crate::api::transport::{ApiRequest, Transport};
use crate::auth::tokens::{now_millis, AccountStore, TokenResponse};
use crate::auth::AuthError;
use crate::config::ClientConfig;

pub struct TokenManager {
    store: Arc<dyn AccountStore>,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    /// Serializes refreshes. Held only while a refresh is in flight;
    /// waiters re-check the store once they get the lock.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl TokenManager {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn AccountStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            transport,
            config,
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Force the cached access token out of the store. Used by the
    /// request coordinator when the server answers 401.
    pub fn invalidate_access_token(&self) {
        self.store.invalidate_access_token();
    }

    /// Token endpoint; lives outside the versioned API root.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.config.server_uri())
    }

    /// Return a usable access token, refreshing it first if the cached
    /// one is missing or expired.
    pub async fn acquire_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited on the gate.
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }
        self.refresh_locked().await
    }

    /// Read of the account recomputed on every decision; never cached.
    fn cached_token(&self) -> Result<Option<String>, AuthError> {
        let account = self.store.account().ok_or(AuthError::NoAccountConfigured)?;
        if account.token_is_fresh(now_millis()) {
            Ok(account.access_token)
        } else {
            Ok(None)
        }
    }

    async fn refresh_locked(&self) -> Result<String, AuthError> {
        let account = self.store.account().ok_or(AuthError::NoAccountConfigured)?;

        // Signal downstream that the stale token must not be reused.
        if account.access_token.is_some() {
            self.store.invalidate_access_token();
        }

        let refresh_token = account.refresh_token.ok_or(AuthError::RefreshFailed {
            reason: "no refresh token stored".into(),
        })?;

        tracing::info!("Access token missing or expired, refreshing...");
        let request = ApiRequest::post_form(
            self.token_url(),
            vec![
                ("grant_type".into(), "refresh_token".into()),
                ("refresh_token".into(), refresh_token),
            ],
        )
        .with_basic(self.config.encoded_client_credential());

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AuthError::RefreshFailed {
                reason: format!("{e}"),
            })?;

        let token_response: TokenResponse =
            response.json().map_err(|e| AuthError::RefreshFailed {
                reason: format!("malformed token response: {e}"),
            })?;

        self.store
            .apply_token_response(&token_response, now_millis());
        tracing::debug!(
            "Token refreshed, expires in {}s",
            token_response.expires_in
        );
        Ok(token_response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{ApiResponse, TransportError};
    use crate::auth::tokens::{AccountRecord, MemoryAccountStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted transport: pops queued results, records every request.
    struct ScriptedTransport {
        results: Mutex<Vec<Result<ApiResponse, TransportError>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<ApiResponse, TransportError>>) -> Self {
            Self {
                results: Mutex::new(results),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Err(TransportError::Network {
                    url: "unexpected".into(),
                    message: "script exhausted".into(),
                })
            } else {
                results.remove(0)
            }
        }
    }

    fn token_body(access: &str, expires_in: u64) -> ApiResponse {
        ApiResponse {
            status: 200,
            body: serde_json::json!({
                "access_token": access,
                "expires_in": expires_in,
            }),
        }
    }

    fn fresh_account() -> AccountRecord {
        AccountRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            expires_at_millis: Some(now_millis() + 60_000),
        }
    }

    fn expired_account() -> AccountRecord {
        AccountRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            expires_at_millis: Some(now_millis() - 1_000),
        }
    }

    fn manager(
        record: Option<AccountRecord>,
        transport: Arc<ScriptedTransport>,
    ) -> (TokenManager, Arc<MemoryAccountStore>) {
        let store = Arc::new(match record {
            Some(record) => MemoryAccountStore::with_account(record),
            None => MemoryAccountStore::new(),
        });
        let mgr = TokenManager::new(
            ClientConfig::default(),
            Arc::clone(&store) as Arc<dyn AccountStore>,
            transport as Arc<dyn Transport>,
        );
        (mgr, store)
    }

    #[tokio::test]
    async fn fresh_token_needs_no_network_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let (mgr, _) = manager(Some(fresh_account()), Arc::clone(&transport));

        let token = mgr.acquire_token().await.unwrap();
        assert_eq!(token, "A1");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_triggers_one_refresh_and_updates_store() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(token_body("A2", 3600))]));
        let (mgr, store) = manager(Some(expired_account()), Arc::clone(&transport));

        let before = now_millis();
        let token = mgr.acquire_token().await.unwrap();
        assert_eq!(token, "A2");
        assert_eq!(transport.calls(), 1);

        let account = store.account().unwrap();
        assert_eq!(account.access_token.as_deref(), Some("A2"));
        let expires_at = account.expires_at_millis.unwrap();
        assert!(expires_at >= before + 3_600_000);
        assert!(expires_at <= now_millis() + 3_600_000);
        // Refresh token untouched: the response omitted a new one
        assert_eq!(account.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_request_carries_grant_and_client_credential() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(token_body("A2", 60))]));
        let (mgr, _) = manager(Some(expired_account()), Arc::clone(&transport));
        mgr.acquire_token().await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.url, "https://id.devlink.io/oauth2/token");
        assert!(request.basic.is_some());
        let form = request.form.as_ref().unwrap();
        assert!(form.contains(&("grant_type".into(), "refresh_token".into())));
        assert!(form.contains(&("refresh_token".into(), "R1".into())));
    }

    #[tokio::test]
    async fn refresh_failure_surfaces_and_keeps_token_invalidated() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 400,
            url: "t".into(),
            body: "invalid_grant".into(),
        })]));
        let (mgr, store) = manager(Some(expired_account()), Arc::clone(&transport));

        let err = mgr.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { .. }));
        // The stale token was invalidated before the attempt
        assert!(store.account().unwrap().access_token.is_none());
    }

    #[tokio::test]
    async fn missing_account_fails_fast() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let (mgr, _) = manager(None, Arc::clone(&transport));
        let err = mgr.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::NoAccountConfigured));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn missing_refresh_token_is_a_refresh_failure() {
        let record = AccountRecord {
            access_token: None,
            refresh_token: None,
            expires_at_millis: None,
        };
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let (mgr, _) = manager(Some(record), Arc::clone(&transport));
        let err = mgr.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_acquires_join_a_single_refresh() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(token_body("A2", 3600))]));
        let (mgr, _) = manager(Some(expired_account()), Arc::clone(&transport));
        let mgr = Arc::new(mgr);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move { mgr.acquire_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "A2");
        }
        // One refresh served all callers
        assert_eq!(transport.calls(), 1);
    }
}
