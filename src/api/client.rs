//! Authenticated client for the Devlink device-management API
//!
//! One explicitly constructed instance owns its collaborators (account
//! store, transport, handshake store, device identity); there is no
//! process-wide singleton. Authenticated operations go through the
//! request coordinator, which handles token acquisition, per-endpoint
//! single-flight, and the one-shot 401 retry.

use std::sync::Arc;

use crate::api::coordinator::RequestCoordinator;
use crate::api::transport::{ApiRequest, ApiResponse, Transport};
use crate::api::{api_url, EndpointKind};
use crate::auth::tokens::now_millis;
use crate::auth::{
    AccountStore, AuthError, HandshakeSecretStore, HandshakeTokenManager, TokenManager,
    TokenResponse,
};
use crate::config::ClientConfig;
use crate::device::DeviceIdentity;

pub struct DeviceClient {
    config: ClientConfig,
    store: Arc<dyn AccountStore>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RequestCoordinator>,
    identity: Arc<dyn DeviceIdentity>,
    handshake: HandshakeTokenManager,
}

impl DeviceClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn AccountStore>,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn DeviceIdentity>,
        handshake_store: Arc<dyn HandshakeSecretStore>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&transport),
        ));
        let coordinator = Arc::new(RequestCoordinator::new(tokens, Arc::clone(&transport)));
        let handshake = HandshakeTokenManager::new(Arc::clone(&store), handshake_store);
        Self {
            config,
            store,
            transport,
            coordinator,
            identity,
            handshake,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn handshake(&self) -> &HandshakeTokenManager {
        &self.handshake
    }

    pub fn account_store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    fn url(&self, resource: &str, action: &str) -> String {
        api_url(self.config.server_uri(), resource, action)
    }

    fn require_account(&self) -> Result<(), AuthError> {
        if self.store.account().is_some() {
            Ok(())
        } else {
            Err(AuthError::NoAccountConfigured)
        }
    }

    /// Tell the server this device is alive. Carries the device id and
    /// carrier name so the backend can correlate the registration.
    pub async fn ping(&self) -> Result<ApiResponse, AuthError> {
        self.require_account()?;
        let url = self.url("device", "ping");
        let body = serde_json::json!({
            "device_id": self.identity.unique_device_id(),
            "carrier": self.identity.carrier_name(),
        });
        self.coordinator
            .perform(EndpointKind::Ping, |token| {
                ApiRequest::post_json(url.clone(), body.clone()).with_bearer(token)
            })
            .await
    }

    /// Report the device's last known position.
    pub async fn report_location(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy: f32,
    ) -> Result<ApiResponse, AuthError> {
        self.require_account()?;
        let url = self.url("device", "report_location");
        let body = serde_json::json!({
            "device_id": self.identity.unique_device_id(),
            "latitude": latitude,
            "longitude": longitude,
            "accuracy": accuracy,
        });
        self.coordinator
            .perform(EndpointKind::ReportLocation, |token| {
                ApiRequest::post_json(url.clone(), body.clone()).with_bearer(token)
            })
            .await
    }

    /// Upload the derived handshake secret that will authorize the
    /// given out-of-band command. The secret is the digest, never the
    /// underlying account token.
    pub async fn send_handshake_secret(
        &self,
        command: &str,
        secret: &str,
    ) -> Result<ApiResponse, AuthError> {
        self.require_account()?;
        let url = self.url("auth", "set_handshake_secret");
        let body = serde_json::json!({
            "device_id": self.identity.unique_device_id(),
            "command": command,
            "secret": secret,
        });
        self.coordinator
            .perform(EndpointKind::SetHandshake, |token| {
                ApiRequest::post_json(url.clone(), body.clone()).with_bearer(token)
            })
            .await
    }

    /// Best-effort notification that a wipe is starting.
    pub async fn send_wipe_started(&self) -> Result<ApiResponse, AuthError> {
        self.require_account()?;
        let url = self.url("device", "wipe_started");
        let body = serde_json::json!({
            "device_id": self.identity.unique_device_id(),
        });
        self.coordinator
            .perform(EndpointKind::WipeStarted, |token| {
                ApiRequest::post_json(url.clone(), body.clone()).with_bearer(token)
            })
            .await
    }

    /// Interactive password-grant login. Goes through the token-grant
    /// slot (a second login replaces an unfinished first one) and
    /// stores the resulting token pair as the configured account.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, AuthError> {
        let request = ApiRequest::post_form(
            self.coordinator.tokens().token_url(),
            vec![
                ("grant_type".into(), "password".into()),
                ("username".into(), username.to_string()),
                ("password".into(), password.to_string()),
            ],
        )
        .with_basic(self.config.encoded_client_credential());

        let response = self
            .coordinator
            .dispatch(EndpointKind::TokenGrant, request)
            .await
            .map_err(|e| match e {
                AuthError::Network(err) => AuthError::RefreshFailed {
                    reason: format!("{err}"),
                },
                other => other,
            })?;

        let token_response: TokenResponse =
            response.json().map_err(|e| AuthError::RefreshFailed {
                reason: format!("malformed token response: {e}"),
            })?;
        self.store
            .apply_token_response(&token_response, now_millis());
        tracing::info!("Login successful, account configured");
        Ok(token_response)
    }

    /// Remove the stored account and credentials.
    pub fn logout(&self) {
        self.store.clear();
        tracing::info!("Account cleared");
    }

    /// Register a new profile. Unauthenticated, no slot bookkeeping.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_profile(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        username: &str,
        password: &str,
        terms_of_service: bool,
    ) -> Result<ApiResponse, AuthError> {
        let url = self.url("profile", "register");
        let body = serde_json::json!({
            "first_name": first_name,
            "last_name": last_name,
            "email": email,
            "username": username,
            "password": password,
            "terms_of_service": terms_of_service,
        });
        self.transport
            .execute(ApiRequest::post_json(url, body))
            .await
            .map_err(AuthError::Network)
    }

    /// Check whether an email/username pair is still available.
    pub async fn check_profile(
        &self,
        email: &str,
        username: &str,
    ) -> Result<ApiResponse, AuthError> {
        let url = self.url("profile", "available");
        let body = serde_json::json!({
            "email": email,
            "username": username,
        });
        self.transport
            .execute(ApiRequest::post_json(url, body))
            .await
            .map_err(AuthError::Network)
    }
}
