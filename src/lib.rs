//! Client library for the Devlink device-management service
//!
//! Owns the access/refresh token lifecycle, coordinates authenticated
//! requests (one in-flight operation per endpoint, one-shot retry on
//! 401), caches derived handshake secrets, and sequences the
//! remote-wipe flow. The HTTP transport, account storage, and the
//! destructive wipe effect are injected behind traits.

pub mod api;
pub mod auth;
pub mod config;
pub mod device;
