//! Device-side collaborators: identity, suspend blocking, wipe

pub mod wipe;

pub use wipe::{DeviceWipeCoordinator, WipeEffect, WipeState};

use std::time::Duration;

/// Where this device's identity comes from is platform business; the
/// client only needs the values.
pub trait DeviceIdentity: Send + Sync {
    /// Stable unique identifier for this device.
    fn unique_device_id(&self) -> String;
    /// Network operator name, when known.
    fn carrier_name(&self) -> Option<String>;
}

/// Identity with fixed values, for the CLI and for tests.
pub struct StaticDeviceIdentity {
    device_id: String,
    carrier: Option<String>,
}

impl StaticDeviceIdentity {
    pub fn new(device_id: impl Into<String>, carrier: Option<&str>) -> Self {
        Self {
            device_id: device_id.into(),
            carrier: carrier.map(String::from),
        }
    }
}

impl DeviceIdentity for StaticDeviceIdentity {
    fn unique_device_id(&self) -> String {
        self.device_id.clone()
    }

    fn carrier_name(&self) -> Option<String> {
        self.carrier.clone()
    }
}

/// Keeps the device from suspending while held. The returned guard
/// releases the lock on drop; `max` bounds how long the platform may
/// honor it.
pub trait SuspendBlocker: Send + Sync {
    fn hold(&self, max: Duration) -> Box<dyn Send>;
}

/// No-op blocker for platforms without suspend (and for tests).
pub struct NoopSuspendBlocker;

impl SuspendBlocker for NoopSuspendBlocker {
    fn hold(&self, _max: Duration) -> Box<dyn Send> {
        Box::new(())
    }
}

/// Generate a fresh device id: 16 random bytes, hex-encoded.
pub fn generate_device_id() -> anyhow::Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| anyhow::anyhow!("random source unavailable: {e}"))?;
    let mut id = String::with_capacity(32);
    for byte in bytes {
        id.push_str(&format!("{byte:02x}"));
    }
    Ok(id)
}
