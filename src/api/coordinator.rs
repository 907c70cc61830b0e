//! Request coordination
//!
//! Wraps "do the network thing with this token" with token acquisition,
//! single-in-flight-per-endpoint bookkeeping, and a one-shot retry on
//! HTTP 401. Each endpoint kind owns one slot; starting a new operation
//! for a slot cancels whatever it held, atomically under the slot lock,
//! and a cancelled operation's result is never delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::api::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::api::EndpointKind;
use crate::auth::{AuthError, TokenManager};

struct Slot {
    generation: u64,
    abort: AbortHandle,
}

type SlotMap = Arc<Mutex<HashMap<EndpointKind, Slot>>>;

pub struct RequestCoordinator {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
    slots: SlotMap,
    next_generation: AtomicU64,
}

impl RequestCoordinator {
    pub fn new(tokens: Arc<TokenManager>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tokens,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Acquire a token, dispatch the built request, and retry exactly
    /// once on 401 after forcing a refresh. A second consecutive 401
    /// surfaces as `Unauthorized`.
    pub async fn perform<F>(&self, kind: EndpointKind, build: F) -> Result<ApiResponse, AuthError>
    where
        F: Fn(&str) -> ApiRequest + Send + Sync,
    {
        match self.attempt(kind, &build).await {
            Err(AuthError::Network(err)) if err.status() == Some(401) => {
                tracing::debug!("{kind:?} got 401, invalidating token and retrying once");
                self.tokens.invalidate_access_token();
                match self.attempt(kind, &build).await {
                    Err(AuthError::Network(err)) if err.status() == Some(401) => {
                        Err(AuthError::Unauthorized)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt<F>(&self, kind: EndpointKind, build: &F) -> Result<ApiResponse, AuthError>
    where
        F: Fn(&str) -> ApiRequest + Send + Sync,
    {
        // The predecessor is cancelled before token acquisition, not
        // merely when the replacement dispatches, so its continuations
        // cannot fire while this caller waits on a refresh.
        self.cancel_in_flight(kind);
        let token = self.tokens.acquire_token().await?;
        self.dispatch(kind, build(&token)).await
    }

    fn cancel_in_flight(&self, kind: EndpointKind) {
        let mut slots = self.slots.lock().expect("slot lock");
        if let Some(old) = slots.remove(&kind) {
            tracing::debug!("Cancelling in-flight {kind:?} request");
            old.abort.abort();
        }
    }

    /// Dispatch with slot bookkeeping but no token handling. Used for
    /// the interactive token-grant path, which has no token yet.
    pub async fn dispatch(
        &self,
        kind: EndpointKind,
        request: ApiRequest,
    ) -> Result<ApiResponse, AuthError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<Result<ApiResponse, TransportError>>();

        {
            // Cancel-then-store must be atomic: holding the lock across
            // the spawn keeps the new task from observing the map before
            // its own slot is recorded.
            let mut slots = self.slots.lock().expect("slot lock");
            if let Some(old) = slots.remove(&kind) {
                tracing::debug!("Cancelling in-flight {kind:?} request");
                old.abort.abort();
            }

            let transport = Arc::clone(&self.transport);
            let slot_map = Arc::clone(&self.slots);
            let task = tokio::spawn(async move {
                let result = transport.execute(request).await;
                let mut slots = slot_map.lock().expect("slot lock");
                let current = slots
                    .get(&kind)
                    .is_some_and(|slot| slot.generation == generation);
                if current {
                    slots.remove(&kind);
                    let _ = tx.send(result);
                } else {
                    // The slot moved on; this result belongs to a
                    // cancelled operation and must not be delivered.
                    tracing::debug!("Discarding stale {kind:?} response");
                }
            });

            slots.insert(
                kind,
                Slot {
                    generation,
                    abort: task.abort_handle(),
                },
            );
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(AuthError::Network(err)),
            // Sender dropped: the operation was aborted or superseded.
            Err(_) => Err(AuthError::Cancelled),
        }
    }
}
