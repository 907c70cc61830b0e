//! API client module for the Devlink device-management service

pub mod client;
pub mod coordinator;
pub mod transport;

pub use client::DeviceClient;
pub use coordinator::RequestCoordinator;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};

pub const API_VERSION: u32 = 1;

/// One logical endpoint, one in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Ping,
    ReportLocation,
    SetHandshake,
    WipeStarted,
    TokenGrant,
}

/// Versioned API URL: `{serverRoot}/api/v1/{resource}/{action}`.
pub fn api_url(server_uri: &str, resource: &str, action: &str) -> String {
    format!("{server_uri}/api/v{API_VERSION}/{resource}/{action}")
}
