//! Lazy, single-flight initialization for tool adapters.
//!
//! Each adapter owns exactly one [`InitGate`] and one handle slot. The first
//! operation to arrive drives the secret-resolve → connection-build sequence;
//! operations arriving while that attempt is in flight suspend and share its
//! outcome, so concurrent traffic never triggers redundant secret fetches or
//! connection builds. A failed attempt is not cached for the process
//! lifetime: the next call after the failure starts exactly one fresh
//! attempt (fail-open retry), and calls concurrent with that fresh attempt
//! single-flight onto it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    config::CredentialSpec,
    error::{ConnectError, InitError},
    secrets::{SecretResolver, SecretValue},
};

/// Builds a live client handle from a resolved secret.
///
/// Target coordinates (endpoints, database names) are fixed into the factory
/// at construction. `build` validates the secret shape before any network
/// handshake and never retries internally.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn build(&self, secret: &SecretValue) -> Result<Self::Handle, ConnectError>;
}

type InitOutcome<H> = Result<H, InitError>;
type InitFuture<H> = BoxFuture<'static, InitOutcome<H>>;
type InitFn<H> = Arc<dyn Fn() -> InitFuture<H> + Send + Sync>;

/// Externally observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

enum Slot<H> {
    Uninitialized,
    Initializing(watch::Receiver<Option<InitOutcome<H>>>),
    Ready(H),
    Failed(InitError),
}

/// Guarded, memoized initialization state machine.
///
/// State transitions happen under one mutex; waiters suspend on a watch
/// channel carrying the attempt outcome. The attempt itself runs in a
/// spawned task, so a caller that is cancelled while suspended cannot
/// strand the other waiters.
pub struct InitGate<H: Clone + Send + Sync + 'static> {
    name: &'static str,
    init: InitFn<H>,
    slot: Arc<Mutex<Slot<H>>>,
}

impl<H: Clone + Send + Sync + 'static> InitGate<H> {
    /// Gate that provisions its handle by resolving `credential` and handing
    /// the secret to `factory`.
    pub fn provisioned<F>(
        name: &'static str,
        resolver: Arc<dyn SecretResolver>,
        factory: F,
        credential: CredentialSpec,
    ) -> Self
    where
        F: ConnectionFactory<Handle = H>,
    {
        let factory = Arc::new(factory);
        let init: InitFn<H> = Arc::new(move || {
            let resolver = Arc::clone(&resolver);
            let factory = Arc::clone(&factory);
            let credential = credential.clone();
            Box::pin(async move {
                let secret = resolver
                    .resolve(&credential.store_id, &credential.secret_name)
                    .await?;
                let handle = factory.build(&secret).await?;
                Ok(handle)
            })
        });
        Self {
            name,
            init,
            slot: Arc::new(Mutex::new(Slot::Uninitialized)),
        }
    }

    /// Gate for adapters that need no remote credential; starts `Ready`.
    pub fn ready(name: &'static str, handle: H) -> Self {
        let cached = handle.clone();
        let init: InitFn<H> = Arc::new(move || {
            let handle = cached.clone();
            Box::pin(async move { Ok(handle) })
        });
        Self {
            name,
            init,
            slot: Arc::new(Mutex::new(Slot::Ready(handle))),
        }
    }

    pub fn status(&self) -> GateStatus {
        match &*self.slot.lock() {
            Slot::Uninitialized => GateStatus::Uninitialized,
            Slot::Initializing(_) => GateStatus::Initializing,
            Slot::Ready(_) => GateStatus::Ready,
            Slot::Failed(_) => GateStatus::Failed,
        }
    }

    /// Single entry point called by every domain operation.
    ///
    /// Returns the cached handle when `Ready`; otherwise either starts one
    /// initialization attempt or suspends on the attempt already in flight.
    /// All callers that observe the same attempt receive the same outcome.
    pub async fn ensure_ready(&self) -> Result<H, InitError> {
        let mut rx = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Initializing(rx) => rx.clone(),
                Slot::Uninitialized | Slot::Failed(_) => {
                    if let Slot::Failed(err) = &*slot {
                        debug!(gate = self.name, error = %err, "retrying failed initialization");
                    }
                    let (tx, rx) = watch::channel(None);
                    *slot = Slot::Initializing(rx.clone());
                    self.spawn_attempt(tx);
                    rx
                }
            }
        };

        let rx_for_compare = rx.clone();
        let wait_outcome = rx.wait_for(|outcome| outcome.is_some()).await;
        let result = match wait_outcome {
            Ok(outcome) => (*outcome)
                .clone()
                .unwrap_or_else(|| Err(InitError::Aborted("empty attempt outcome".to_string()))),
            Err(_) => {
                // The attempt task died without reporting. Repair the slot so
                // later callers can start fresh instead of waiting forever.
                let err = InitError::Aborted(
                    "initialization task stopped without reporting".to_string(),
                );
                let mut slot = self.slot.lock();
                if let Slot::Initializing(current) = &*slot {
                    if current.same_channel(&rx_for_compare) {
                        *slot = Slot::Failed(err.clone());
                    }
                }
                Err(err)
            }
        };
        result
    }

    fn spawn_attempt(&self, tx: watch::Sender<Option<InitOutcome<H>>>) {
        info!(gate = self.name, "initializing");
        let fut = (self.init)();
        let slot = Arc::clone(&self.slot);
        let name = self.name;
        tokio::spawn(async move {
            let outcome = fut.await;
            {
                let mut slot = slot.lock();
                match &outcome {
                    Ok(handle) => {
                        info!(gate = name, "ready");
                        *slot = Slot::Ready(handle.clone());
                    }
                    Err(err) => {
                        warn!(gate = name, error = %err, "initialization failed");
                        *slot = Slot::Failed(err.clone());
                    }
                }
            }
            // Publish after the slot transition so no waiter ever resumes
            // against a non-terminal slot.
            let _ = tx.send(Some(outcome));
        });
    }
}
