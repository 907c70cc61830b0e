//! Transport boundary
//!
//! One network call in, one typed response or structured failure out.
//! The trait keeps the orchestration layer independent of reqwest so
//! tests can script responses without a server.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method for an API request. Only the verbs the service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully-shaped request ready for dispatch.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Bearer access token, for authenticated API endpoints.
    pub bearer: Option<String>,
    /// Pre-encoded `client_id:secret` credential, for the token endpoint.
    pub basic: Option<String>,
    /// Form-encoded body (token endpoint).
    pub form: Option<Vec<(String, String)>>,
    /// JSON body (versioned API endpoints).
    pub json: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            bearer: None,
            basic: None,
            form: None,
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            bearer: None,
            basic: None,
            form: None,
            json: Some(body),
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            bearer: None,
            basic: None,
            form: Some(fields),
            json: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_basic(mut self, credential: impl Into<String>) -> Self {
        self.basic = Some(credential.into());
        self
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, `Null` when the body was empty or not JSON.
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Deserialize the body into a typed response.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// Transport-level failure. Any non-2xx status lands in `Status`;
/// connection/TLS/timeout problems land in `Network`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },
}

impl TransportError {
    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } => None,
        }
    }
}

/// Executes one network call. Implementations must be cancel-safe:
/// dropping the returned future must abandon the call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = request.url.clone();
        tracing::debug!("{:?} {}", request.method, url);

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(credential) = &request.basic {
            builder = builder.header("Authorization", format!("Basic {}", credential));
        }
        if let Some(fields) = &request.form {
            builder = builder.form(fields);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| TransportError::Network {
            url: url.clone(),
            message: format!("{e:#}"),
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, url, body });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network {
                url: url.clone(),
                message: format!("{e:#}"),
            })
            .map(|bytes| serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))?;

        Ok(ApiResponse { status, body })
    }
}
