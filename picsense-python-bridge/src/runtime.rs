//! Python callable invocation.
//!
//! Rather than embedding an interpreter with PyO3, each callable runs in a
//! short-lived subprocess of the bundled venv interpreter: a small `-c`
//! runner imports the requested module, applies the positional string
//! arguments, and prints a JSON envelope on stdout. This sidesteps
//! build-time Python version conflicts and means concurrent invocations
//! genuinely run in parallel (each call owns its own interpreter, there is
//! no shared execution lock).

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::bootstrap::RuntimePaths;

#[derive(Error, Debug)]
pub enum PythonRuntimeError {
    #[error("Failed to start interpreter: {0}")]
    Spawn(#[from] io::Error),

    #[error("Interpreter failed: {0}")]
    Interpreter(String),

    #[error("Failed to import module {module}: {error}")]
    Import { module: String, error: String },

    #[error("Failed to call {callable}: {error}")]
    Call { callable: String, error: String },
}

/// The seam between the dispatcher and the embedded runtime.
///
/// Production code uses [`PythonRuntime`]; tests substitute stubs and spies.
pub trait Invoker: Send + Sync + 'static {
    /// Invoke `module.callable(*args)` and return its stringified result.
    fn invoke(
        &self,
        module: &str,
        callable: &str,
        args: &[String],
    ) -> impl Future<Output = Result<String, PythonRuntimeError>> + Send;
}

/// Runner executed with `python -c`. Reads (module, callable, args...) from
/// argv and prints exactly one JSON envelope line as its final output.
const RUNNER: &str = r#"
import importlib, json, sys, traceback

module, callable_name = sys.argv[1], sys.argv[2]
args = sys.argv[3:]
try:
    mod = importlib.import_module(module)
except Exception as e:
    print(json.dumps({"ok": False, "stage": "import", "error": str(e)}))
    sys.exit(0)
try:
    value = getattr(mod, callable_name)(*args)
except Exception as e:
    detail = "".join(traceback.format_exception_only(type(e), e)).strip()
    print(json.dumps({"ok": False, "stage": "call", "error": detail}))
    sys.exit(0)
print(json.dumps({"ok": True, "value": str(value)}))
"#;

#[derive(Debug, Deserialize)]
struct RunnerEnvelope {
    ok: bool,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Invoker backed by the bootstrapped venv interpreter.
pub struct PythonRuntime {
    paths: RuntimePaths,
    modules_dir: PathBuf,
}

impl PythonRuntime {
    /// # Arguments
    /// * `paths` - The runtime paths from bootstrap
    /// * `modules_dir` - Directory holding the bundled analysis modules
    pub fn new(paths: RuntimePaths, modules_dir: PathBuf) -> Self {
        Self { paths, modules_dir }
    }

    async fn run(
        &self,
        module: &str,
        callable: &str,
        args: &[String],
    ) -> Result<String, PythonRuntimeError> {
        debug!(module, callable, ?args, "invoking python callable");

        let output = Command::new(&self.paths.venv_python)
            .arg("-c")
            .arg(RUNNER)
            .arg(module)
            .arg(callable)
            .args(args)
            .env("PYTHONPATH", &self.modules_dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(PythonRuntimeError::Interpreter(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // Analysis modules are free to print; the envelope is always the
        // last line the runner emits.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let envelope_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default();

        let envelope: RunnerEnvelope = serde_json::from_str(envelope_line).map_err(|_| {
            PythonRuntimeError::Interpreter(format!(
                "interpreter produced no result envelope: {}",
                stdout.trim()
            ))
        })?;

        envelope_to_result(envelope, module, callable)
    }
}

fn envelope_to_result(
    envelope: RunnerEnvelope,
    module: &str,
    callable: &str,
) -> Result<String, PythonRuntimeError> {
    if envelope.ok {
        return Ok(envelope.value.unwrap_or_default());
    }

    let error = envelope.error.unwrap_or_else(|| "unknown error".to_string());
    match envelope.stage.as_deref() {
        Some("import") => Err(PythonRuntimeError::Import {
            module: module.to_string(),
            error,
        }),
        _ => Err(PythonRuntimeError::Call {
            callable: format!("{module}.{callable}"),
            error,
        }),
    }
}

impl Invoker for PythonRuntime {
    fn invoke(
        &self,
        module: &str,
        callable: &str,
        args: &[String],
    ) -> impl Future<Output = Result<String, PythonRuntimeError>> + Send {
        self.run(module, callable, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> RunnerEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn success_envelope_yields_value() {
        let result = envelope_to_result(
            envelope(r#"{"ok": true, "value": "42"}"#),
            "analyze_layout",
            "analyze_single_image",
        );
        assert_eq!(result.unwrap(), "42");
    }

    #[test]
    fn import_failure_maps_to_import_error() {
        let result = envelope_to_result(
            envelope(r#"{"ok": false, "stage": "import", "error": "No module named 'x'"}"#),
            "x",
            "f",
        );
        assert!(matches!(
            result,
            Err(PythonRuntimeError::Import { module, .. }) if module == "x"
        ));
    }

    #[test]
    fn call_failure_names_the_callable() {
        let result = envelope_to_result(
            envelope(r#"{"ok": false, "stage": "call", "error": "ValueError: bad image"}"#),
            "analyze_layout",
            "analyze_single_image",
        );
        match result {
            Err(PythonRuntimeError::Call { callable, error }) => {
                assert_eq!(callable, "analyze_layout.analyze_single_image");
                assert!(error.contains("bad image"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invoke_runs_the_configured_interpreter() {
        use std::os::unix::fs::PermissionsExt;

        // Fake interpreter: ignores -c/runner ($1/$2), echoes the first
        // callable argument ($5) back inside a success envelope.
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("python");
        std::fs::write(
            &exe,
            "#!/bin/sh\nprintf '{\"ok\": true, \"value\": \"%s\"}\\n' \"$5\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut paths = RuntimePaths::new(dir.path());
        paths.venv_python = exe;

        let runtime = PythonRuntime::new(paths, dir.path().to_path_buf());
        let result = runtime
            .invoke(
                "instagram_downloader",
                "download_instagram_image",
                &["https://example.com/p/abc".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(result, "https://example.com/p/abc");
    }
}
