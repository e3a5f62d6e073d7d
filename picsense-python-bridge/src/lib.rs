//! Python bridge for PicSense.
//!
//! This crate handles:
//! 1. Bootstrapping an isolated Python environment (downloading
//!    python-build-standalone, venv, analysis requirements)
//! 2. Gating every operation on the one-time runtime startup
//! 3. Dispatching named operations from the host's method channels to the
//!    bundled analysis callables, with structured success/error replies

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod logging;
pub mod registry;
pub mod result;
pub mod runtime;

pub use bootstrap::{ensure_python_runtime, BootstrapProgress, PythonBootstrapError, RuntimePaths};
pub use channel::{invoke_on, MethodCall, PythonBridge};
pub use config::{BridgeConfig, ConfigError};
pub use dispatch::{Dispatcher, InvocationRequest};
pub use gate::{BootstrapFailed, RuntimeGate, RuntimeState};
pub use registry::{ChannelId, Operation, PayloadShape};
pub use result::{ErrorKind, InvocationResult, Payload};
pub use runtime::{Invoker, PythonRuntime, PythonRuntimeError};
