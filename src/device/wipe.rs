//! Remote-wipe orchestration
//!
//! The wipe itself is an external, irreversible effect; this module
//! only sequences it: notify the backend that the wipe is starting
//! (best effort), then either run the effect or skip it when a
//! debug-only override says so. A suspend blocker is held for the
//! whole sequence so the device cannot sleep mid-notification.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::client::DeviceClient;
use crate::device::SuspendBlocker;

/// The destructive local wipe action. Implementations are expected to
/// not return errors; whatever happens after this is the platform's
/// problem.
pub trait WipeEffect: Send + Sync {
    fn wipe(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeState {
    Idle,
    WipeStartNotifying,
    WipeStartNotified,
    WipeExecuting,
    WipeDone,
    SkippedByConfig,
}

pub struct DeviceWipeCoordinator {
    client: Arc<DeviceClient>,
    effect: Arc<dyn WipeEffect>,
    blocker: Arc<dyn SuspendBlocker>,
    state: Arc<Mutex<WipeState>>,
}

/// Upper bound on how long the suspend blocker is honored.
const WIPE_BLOCK_MAX: Duration = Duration::from_secs(60);

impl DeviceWipeCoordinator {
    pub fn new(
        client: Arc<DeviceClient>,
        effect: Arc<dyn WipeEffect>,
        blocker: Arc<dyn SuspendBlocker>,
    ) -> Self {
        Self {
            client,
            effect,
            blocker,
            state: Arc::new(Mutex::new(WipeState::Idle)),
        }
    }

    pub fn state(&self) -> WipeState {
        *self.state.lock().expect("wipe state lock")
    }

    /// Run the wipe sequence off the caller's task. The returned handle
    /// completes when the sequence has finished; callers that only need
    /// to trigger the wipe can drop it.
    pub fn destroy_device(&self) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let effect = Arc::clone(&self.effect);
        let blocker = Arc::clone(&self.blocker);
        let state = Arc::clone(&self.state);
        let skip = client.config().skip_wipe();

        tokio::spawn(async move {
            let _guard = blocker.hold(WIPE_BLOCK_MAX);

            set_state(&state, WipeState::WipeStartNotifying);
            // Best-effort telemetry; a failed notification never blocks
            // the wipe decision.
            match client.send_wipe_started().await {
                Ok(_) => tracing::debug!("Wipe-start notification sent"),
                Err(e) => tracing::warn!("Wipe-start notification failed: {e}"),
            }
            set_state(&state, WipeState::WipeStartNotified);

            if skip {
                tracing::info!("Skip-wipe override set, not wiping");
                set_state(&state, WipeState::SkippedByConfig);
                return;
            }

            tracing::info!("Wiping device");
            set_state(&state, WipeState::WipeExecuting);
            effect.wipe();
            set_state(&state, WipeState::WipeDone);
        })
    }
}

fn set_state(state: &Mutex<WipeState>, next: WipeState) {
    *state.lock().expect("wipe state lock") = next;
}
