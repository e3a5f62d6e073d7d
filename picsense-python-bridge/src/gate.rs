//! One-time runtime startup gate.
//!
//! Startup runs exactly once no matter how many callers race into
//! [`RuntimeGate::initialize`], and every operation waits in
//! [`RuntimeGate::await_ready`] until startup reaches a terminal state.
//! A failed startup is terminal too: waiters are released with the failure
//! instead of blocking forever.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

/// Observable runtime lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

enum GateState<R> {
    Uninitialized,
    Initializing,
    Ready(Arc<R>),
    Failed(Arc<str>),
}

/// Startup failed; carried to every waiter, past and future.
#[derive(Error, Debug, Clone)]
#[error("python runtime failed to start: {reason}")]
pub struct BootstrapFailed {
    pub reason: Arc<str>,
}

/// Gate guarding the one-time startup of the embedded runtime.
///
/// `R` is the runtime handle produced by a successful bootstrap, shared
/// with all dispatch paths once the gate opens.
pub struct RuntimeGate<R> {
    tx: watch::Sender<GateState<R>>,
}

impl<R> RuntimeGate<R> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Uninitialized);
        Self { tx }
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> RuntimeState {
        match &*self.tx.borrow() {
            GateState::Uninitialized => RuntimeState::Uninitialized,
            GateState::Initializing => RuntimeState::Initializing,
            GateState::Ready(_) => RuntimeState::Ready,
            GateState::Failed(_) => RuntimeState::Failed,
        }
    }

    /// Run `bootstrap` exactly once and open the gate with its result.
    ///
    /// Idempotent: if startup is already running or finished, this returns
    /// immediately without re-running bootstrap and without erroring. The
    /// Uninitialized -> Initializing transition is a single atomic
    /// check-and-set on the state channel, so concurrent callers can never
    /// both claim startup.
    ///
    /// The claiming caller gets the bootstrap error back directly; everyone
    /// else observes it through [`RuntimeGate::await_ready`].
    pub async fn initialize<F, Fut, E>(&self, bootstrap: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        let claimed = self.tx.send_if_modified(|state| {
            if matches!(state, GateState::Uninitialized) {
                *state = GateState::Initializing;
                true
            } else {
                false
            }
        });

        if !claimed {
            return Ok(());
        }

        info!("starting embedded runtime");
        match bootstrap().await {
            Ok(runtime) => {
                self.tx.send_replace(GateState::Ready(Arc::new(runtime)));
                info!("embedded runtime ready");
                Ok(())
            }
            Err(e) => {
                let reason: Arc<str> = e.to_string().into();
                error!("embedded runtime startup failed: {reason}");
                self.tx.send_replace(GateState::Failed(reason));
                Err(e)
            }
        }
    }

    /// Wait until startup reaches a terminal state.
    ///
    /// All waiters blocked here are released together when the gate opens
    /// (or fails); callers arriving afterwards return immediately.
    pub async fn await_ready(&self) -> Result<Arc<R>, BootstrapFailed> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, GateState::Ready(_) | GateState::Failed(_)))
            .await
            .map_err(|_| BootstrapFailed {
                reason: "runtime gate dropped before startup finished".into(),
            })?;

        match &*state {
            GateState::Ready(runtime) => Ok(Arc::clone(runtime)),
            GateState::Failed(reason) => Err(BootstrapFailed {
                reason: Arc::clone(reason),
            }),
            // wait_for only yields terminal states.
            GateState::Uninitialized | GateState::Initializing => unreachable!(),
        }
    }
}

impl<R> Default for RuntimeGate<R> {
    fn default() -> Self {
        Self::new()
    }
}
