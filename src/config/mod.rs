//! Configuration and credential storage
//!
//! Two separate concerns live here: `ClientConfig`, the explicit
//! runtime configuration handed to the client at construction (no
//! process-global property reads), and `Profile`, the on-disk record
//! of the account's credentials and device id.

use anyhow::{Context, Result};
use base64::Engine;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::auth::tokens::{AccountRecord, AccountStore, TokenResponse};

/// Production server root.
pub const DEFAULT_SERVER_URI: &str = "https://id.devlink.io";

/// OAuth2 client credential for this device class.
const CLIENT_ID: &str = "8001";
const CLIENT_SECRET: &str = "b93bb90299bb46f3bafdd6ca630c8f3c";

/// Runtime configuration for the client.
///
/// The overrides are honored only in debug mode; a production build
/// always talks to the default server and never skips the wipe.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub debug_mode: bool,
    pub server_uri_override: Option<String>,
    pub skip_wipe_override: bool,
}

impl ClientConfig {
    /// Server root for all URL construction.
    pub fn server_uri(&self) -> &str {
        if self.debug_mode {
            if let Some(uri) = self.server_uri_override.as_deref() {
                if !uri.is_empty() {
                    return uri;
                }
            }
        }
        DEFAULT_SERVER_URI
    }

    /// Whether the destructive wipe step should be skipped (debug only).
    pub fn skip_wipe(&self) -> bool {
        self.debug_mode && self.skip_wipe_override
    }

    /// Base64 `client_id:secret` credential for the token endpoint.
    pub fn encoded_client_credential(&self) -> String {
        base64::engine::general_purpose::STANDARD
            .encode(format!("{CLIENT_ID}:{CLIENT_SECRET}").as_bytes())
    }
}

/// On-disk profile: account credentials plus the stable device id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Profile {
    pub account: Option<AccountRecord>,
    pub device_id: Option<String>,
}

impl Profile {
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "devlink", "devlink-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    fn profile_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("profile.toml"))
    }

    /// Load the profile from disk, defaulting when none exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::profile_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read profile file")?;
        toml::from_str(&content).context("Failed to parse profile file")
    }

    /// Save the profile to disk with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        let path = Self::profile_path()?;
        self.save_to(&path)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize profile")?;
        fs::write(path, content).context("Failed to write profile file")?;

        // Restrictive permissions: the file holds tokens
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set profile permissions")?;
        }

        Ok(())
    }
}

/// `AccountStore` backed by the profile file. Every mutation is written
/// back immediately; a failed write is logged, not surfaced, so token
/// state stays usable for the rest of the process.
pub struct FileAccountStore {
    inner: Mutex<Profile>,
}

impl FileAccountStore {
    pub fn load() -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(Profile::load()?),
        })
    }

    pub fn from_profile(profile: Profile) -> Self {
        Self {
            inner: Mutex::new(profile),
        }
    }

    fn persist(profile: &Profile) {
        if let Err(e) = profile.save() {
            tracing::warn!("Failed to persist profile: {e:#}");
        }
    }
}

impl AccountStore for FileAccountStore {
    fn account(&self) -> Option<AccountRecord> {
        self.inner.lock().expect("profile lock").account.clone()
    }

    fn apply_token_response(&self, response: &TokenResponse, now_millis: i64) {
        let mut guard = self.inner.lock().expect("profile lock");
        guard
            .account
            .get_or_insert_with(AccountRecord::default)
            .apply(response, now_millis);
        Self::persist(&guard);
    }

    fn invalidate_access_token(&self) {
        let mut guard = self.inner.lock().expect("profile lock");
        if let Some(account) = guard.account.as_mut() {
            account.access_token = None;
        }
        Self::persist(&guard);
    }

    fn clear(&self) {
        let mut guard = self.inner.lock().expect("profile lock");
        guard.account = None;
        Self::persist(&guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_uri_override_requires_debug_mode() {
        let config = ClientConfig {
            debug_mode: false,
            server_uri_override: Some("http://localhost:8080".into()),
            skip_wipe_override: false,
        };
        assert_eq!(config.server_uri(), DEFAULT_SERVER_URI);

        let config = ClientConfig {
            debug_mode: true,
            ..config
        };
        assert_eq!(config.server_uri(), "http://localhost:8080");
    }

    #[test]
    fn empty_override_falls_back_to_default() {
        let config = ClientConfig {
            debug_mode: true,
            server_uri_override: Some(String::new()),
            skip_wipe_override: false,
        };
        assert_eq!(config.server_uri(), DEFAULT_SERVER_URI);
    }

    #[test]
    fn skip_wipe_requires_debug_mode() {
        let config = ClientConfig {
            debug_mode: false,
            server_uri_override: None,
            skip_wipe_override: true,
        };
        assert!(!config.skip_wipe());

        let config = ClientConfig {
            debug_mode: true,
            ..config
        };
        assert!(config.skip_wipe());
    }

    #[test]
    fn client_credential_is_base64_id_colon_secret() {
        let config = ClientConfig::default();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(config.encoded_client_credential())
            .unwrap();
        let decoded = String::from_utf8(decoded).unwrap();
        assert_eq!(decoded, format!("{CLIENT_ID}:{CLIENT_SECRET}"));
    }

    #[test]
    fn profile_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");

        let profile = Profile {
            account: Some(AccountRecord {
                access_token: Some("A1".into()),
                refresh_token: Some("R1".into()),
                expires_at_millis: Some(42),
            }),
            device_id: Some("d3adb33f".into()),
        };
        profile.save_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let loaded: Profile = toml::from_str(&content).unwrap();
        let account = loaded.account.unwrap();
        assert_eq!(account.access_token.as_deref(), Some("A1"));
        assert_eq!(account.expires_at_millis, Some(42));
        assert_eq!(loaded.device_id.as_deref(), Some("d3adb33f"));
    }
}
