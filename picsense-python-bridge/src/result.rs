//! Invocation results and outcome normalization.
//!
//! Everything a runtime callable does — clean return, raised fault, even a
//! failed startup — is converted into one [`InvocationResult`] value here.
//! No failure crosses the bridge boundary as a panic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::gate::BootstrapFailed;
use crate::registry::{Operation, PayloadShape};
use crate::runtime::PythonRuntimeError;

/// Success payload delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Object(Map<String, Value>),
}

/// Failure taxonomy. Unknown operations are not errors; they get the
/// distinct [`InvocationResult::NotImplemented`] reply instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required argument was missing or empty; detected before any
    /// runtime interaction.
    InvalidArgument,
    /// The runtime callable raised a fault during execution.
    RuntimeInvocation,
    /// Runtime startup itself failed; no callable ever ran.
    RuntimeBootstrap,
}

/// The single reply produced for every invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResult {
    Success {
        payload: Payload,
    },
    Error {
        kind: ErrorKind,
        code: String,
        message: String,
    },
    NotImplemented,
}

impl InvocationResult {
    pub fn invalid_argument(role: &str) -> Self {
        InvocationResult::Error {
            kind: ErrorKind::InvalidArgument,
            code: "INVALID_ARGUMENT".to_string(),
            message: format!("{role} is null"),
        }
    }

    pub fn bootstrap_failure(failure: &BootstrapFailed) -> Self {
        InvocationResult::Error {
            kind: ErrorKind::RuntimeBootstrap,
            code: "BOOTSTRAP_ERROR".to_string(),
            message: failure.to_string(),
        }
    }
}

/// Convert a raw invocation outcome into the reply shape the operation's
/// channel contract promises.
///
/// Wrapped operations (color-style analysis) never produce a transport-level
/// error for a callable fault: the host keys off the `success` flag inside
/// the payload, so faults come back as `{success: false, error}`.
pub fn normalize(
    op: &Operation,
    outcome: Result<String, PythonRuntimeError>,
) -> InvocationResult {
    match (op.shape, outcome) {
        (PayloadShape::Text, Ok(raw)) => InvocationResult::Success {
            payload: Payload::Text(raw),
        },
        (PayloadShape::Wrapped, Ok(raw)) => {
            let mut payload = Map::new();
            payload.insert("raw_json".to_string(), Value::String(raw));
            payload.insert("success".to_string(), Value::Bool(true));
            InvocationResult::Success {
                payload: Payload::Object(payload),
            }
        }
        (PayloadShape::Wrapped, Err(e)) => {
            let mut payload = Map::new();
            payload.insert("success".to_string(), Value::Bool(false));
            payload.insert("error".to_string(), Value::String(e.to_string()));
            InvocationResult::Success {
                payload: Payload::Object(payload),
            }
        }
        (PayloadShape::Text, Err(e)) => InvocationResult::Error {
            kind: ErrorKind::RuntimeInvocation,
            code: op.error_code.to_string(),
            message: e.to_string(),
        },
    }
}
