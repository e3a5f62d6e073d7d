//! Host-facing method channels.
//!
//! The host talks to the bridge through two named channels, passing named
//! string arguments. This module orders those arguments into the positional
//! form the callables take, spawns dispatch off the caller's context, and
//! hands back the reply when it arrives.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::bootstrap::{self, PythonBootstrapError};
use crate::config::BridgeConfig;
use crate::dispatch::{Dispatcher, InvocationRequest};
use crate::gate::{RuntimeGate, RuntimeState};
use crate::registry::{self, ChannelId};
use crate::result::{ErrorKind, InvocationResult};
use crate::runtime::{Invoker, PythonRuntime};

/// One call as the host frames it: a method name plus named arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: HashMap<String, Option<String>>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: HashMap::new(),
        }
    }

    pub fn arg(mut self, role: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(role.into(), Some(value.into()));
        self
    }
}

/// Dispatch one call through `dispatcher` and await its reply.
///
/// The wait-then-invoke sequence runs on a spawned task, never on the
/// caller's context; the oneshot carries the reply back to whoever awaits.
pub async fn invoke_on<R: Invoker>(
    dispatcher: &Arc<Dispatcher<R>>,
    channel: ChannelId,
    call: MethodCall,
) -> InvocationResult {
    let args = ordered_args(channel, &call);
    let (reply_tx, reply_rx) = oneshot::channel();
    let request = InvocationRequest {
        channel,
        operation: call.method,
        args,
        reply_to: reply_tx,
    };

    let dispatcher = Arc::clone(dispatcher);
    tokio::spawn(async move {
        dispatcher.handle(request).await;
    });

    match reply_rx.await {
        Ok(result) => result,
        // The dispatcher always replies; losing the handle means its task
        // was torn down mid-flight.
        Err(_) => InvocationResult::Error {
            kind: ErrorKind::RuntimeInvocation,
            code: "BRIDGE_ERROR".to_string(),
            message: "reply channel closed before a result was produced".to_string(),
        },
    }
}

/// Order the named arguments by the operation's declared roles.
///
/// Unknown operations get an empty argument list; the dispatcher turns them
/// into the not-implemented reply.
fn ordered_args(channel: ChannelId, call: &MethodCall) -> Vec<Option<String>> {
    let Some(op) = registry::resolve(channel, &call.method) else {
        return Vec::new();
    };
    op.arg_roles
        .iter()
        .map(|role| call.arguments.get(*role).cloned().flatten())
        .collect()
}

/// The assembled bridge: gate, dispatcher, and the bootstrapped Python
/// runtime behind them.
pub struct PythonBridge {
    dispatcher: Arc<Dispatcher<PythonRuntime>>,
    gate: Arc<RuntimeGate<PythonRuntime>>,
}

impl PythonBridge {
    /// Start the bridge. Runtime startup runs on a background task; calls
    /// made before it finishes wait at the gate, they are never rejected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: BridgeConfig) -> Self {
        let gate = Arc::new(RuntimeGate::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&gate)));

        let init_gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let outcome = init_gate
                .initialize(|| async move {
                    let paths = bootstrap::ensure_python_runtime(&config, |progress| {
                        debug!(?progress, "bootstrap progress");
                    })
                    .await?;
                    Ok::<_, PythonBootstrapError>(PythonRuntime::new(
                        paths,
                        config.modules_dir.clone(),
                    ))
                })
                .await;
            if let Err(e) = outcome {
                // Waiters already saw the failure through the gate.
                error!("python runtime startup failed: {e}");
            }
        });

        Self { dispatcher, gate }
    }

    /// Current runtime lifecycle state.
    pub fn state(&self) -> RuntimeState {
        self.gate.state()
    }

    /// Invoke a method on a named channel.
    ///
    /// Unknown channel names reply not-implemented, same as unknown methods.
    pub async fn invoke(&self, channel: &str, call: MethodCall) -> InvocationResult {
        let Some(channel) = ChannelId::from_name(channel) else {
            return InvocationResult::NotImplemented;
        };
        invoke_on(&self.dispatcher, channel, call).await
    }
}
