//! Operation dispatch.
//!
//! Every invocation runs off the caller's context: resolve the operation,
//! fail fast on missing arguments, wait for the runtime gate, invoke the
//! callable, normalize the outcome, and deliver exactly one reply through
//! the request's completion handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::gate::RuntimeGate;
use crate::registry::{self, ChannelId};
use crate::result::{normalize, InvocationResult};
use crate::runtime::Invoker;

/// One incoming call from the host. Consumed once; the reply handle
/// guarantees at most one reply, the dispatcher guarantees at least one.
#[derive(Debug)]
pub struct InvocationRequest {
    pub channel: ChannelId,
    pub operation: String,
    /// Positional arguments in the operation's declared role order.
    pub args: Vec<Option<String>>,
    pub reply_to: oneshot::Sender<InvocationResult>,
}

/// Routes requests to runtime callables once the gate opens.
pub struct Dispatcher<R> {
    gate: Arc<RuntimeGate<R>>,
}

impl<R: Invoker> Dispatcher<R> {
    pub fn new(gate: Arc<RuntimeGate<R>>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<RuntimeGate<R>> {
        &self.gate
    }

    /// Handle one request and deliver its reply.
    pub async fn handle(&self, request: InvocationRequest) {
        let InvocationRequest {
            channel,
            operation,
            args,
            reply_to,
        } = request;

        let result = self.execute(channel, &operation, &args).await;

        if reply_to.send(result).is_err() {
            debug!(%operation, "reply receiver dropped before delivery");
        }
    }

    async fn execute(
        &self,
        channel: ChannelId,
        operation: &str,
        args: &[Option<String>],
    ) -> InvocationResult {
        let Some(op) = registry::resolve(channel, operation) else {
            debug!(channel = channel.name(), operation, "operation not implemented");
            return InvocationResult::NotImplemented;
        };

        // Missing arguments fail before the gate wait; the runtime is never
        // touched for an invalid call.
        let mut positional = Vec::with_capacity(op.arg_roles.len());
        for (index, role) in op.arg_roles.iter().copied().enumerate() {
            match args.get(index).and_then(|arg| arg.as_deref()) {
                Some(value) if !value.is_empty() => positional.push(value.to_string()),
                _ => {
                    warn!(operation, role, "missing required argument");
                    return InvocationResult::invalid_argument(role);
                }
            }
        }

        let runtime = match self.gate.await_ready().await {
            Ok(runtime) => runtime,
            Err(failure) => {
                warn!(operation, %failure, "rejecting call: runtime never started");
                return InvocationResult::bootstrap_failure(&failure);
            }
        };

        let outcome = runtime.invoke(op.module, op.callable, &positional).await;
        normalize(op, outcome)
    }

    /// Drain a request stream, handling each request on its own task.
    ///
    /// Requests in flight run concurrently; no ordering is promised between
    /// them. Replies reach whichever context holds the matching receiver.
    pub async fn serve(self: Arc<Self>, mut requests: mpsc::Receiver<InvocationRequest>) {
        while let Some(request) = requests.recv().await {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                dispatcher.handle(request).await;
            });
        }
        debug!("request channel closed, dispatcher stopping");
    }
}
