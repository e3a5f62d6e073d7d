//! Python runtime bootstrapper.
//!
//! Downloads and sets up an isolated Python environment using
//! python-build-standalone, then installs the analysis dependencies into a
//! venv. Keeping the interpreter isolated means a system Python upgrade can
//! never break the analysis modules.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::fs;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

/// Target Python version series.
const PYTHON_VERSION: &str = "3.13";
const PYTHON_BUILD_STANDALONE_RELEASE: &str = "20251120";

#[derive(Error, Debug)]
pub enum PythonBootstrapError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to download Python: {0}")]
    Download(String),

    #[error("Failed to extract Python archive: {0}")]
    Extract(String),

    #[error("Failed to create virtual environment: {0}")]
    CreateVenv(String),

    #[error("Failed to install analysis requirements: {0}")]
    InstallRequirements(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Paths to the isolated Python runtime.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Root directory for all runtime files (e.g. `<data_dir>/runtime`).
    pub root: PathBuf,
    /// Path to the Python installation.
    pub python_dir: PathBuf,
    /// Path to the base Python executable.
    pub python_exe: PathBuf,
    /// Path to the virtual environment.
    pub venv_dir: PathBuf,
    /// Path to the venv Python executable. This is the interpreter every
    /// callable invocation runs under.
    pub venv_python: PathBuf,
    /// Path to pip in the venv.
    pub venv_pip: PathBuf,
}

impl RuntimePaths {
    pub fn new(data_dir: &Path) -> Self {
        let root = data_dir.join("runtime");
        let python_dir = root.join("python");

        #[cfg(unix)]
        let python_exe = python_dir.join("bin").join("python3");
        #[cfg(windows)]
        let python_exe = python_dir.join("python.exe");

        let venv_dir = root.join("venv");

        #[cfg(unix)]
        let (venv_python, venv_pip) = (
            venv_dir.join("bin").join("python"),
            venv_dir.join("bin").join("pip"),
        );
        #[cfg(windows)]
        let (venv_python, venv_pip) = (
            venv_dir.join("Scripts").join("python.exe"),
            venv_dir.join("Scripts").join("pip.exe"),
        );

        Self {
            root,
            python_dir,
            python_exe,
            venv_dir,
            venv_python,
            venv_pip,
        }
    }

    /// Check if the runtime is fully set up.
    pub fn is_ready(&self) -> bool {
        self.venv_python.exists() && self.venv_pip.exists()
    }
}

/// Progress updates during bootstrap.
#[derive(Debug, Clone)]
pub enum BootstrapProgress {
    FetchingInterpreter { percent: u8 },
    CreatingVenv,
    InstallingRequirements,
    Ready,
}

/// Ensure the Python runtime is available, downloading and setting it up if
/// needed. This is the slow path behind the runtime gate: first launch takes
/// on the order of seconds to minutes, later launches return immediately.
pub async fn ensure_python_runtime(
    config: &BridgeConfig,
    progress_callback: impl Fn(BootstrapProgress),
) -> Result<RuntimePaths, PythonBootstrapError> {
    let paths = RuntimePaths::new(&config.data_dir);

    if paths.is_ready() {
        info!("Python runtime already available at {:?}", paths.venv_python);
        progress_callback(BootstrapProgress::Ready);
        return Ok(paths);
    }

    info!("Setting up isolated Python runtime...");

    fs::create_dir_all(&paths.root).map_err(|e| PythonBootstrapError::CreateDir {
        path: paths.root.clone(),
        source: e,
    })?;

    if !paths.python_exe.exists() {
        progress_callback(BootstrapProgress::FetchingInterpreter { percent: 0 });
        download_python(&paths, |p| {
            progress_callback(BootstrapProgress::FetchingInterpreter { percent: p });
        })
        .await?;
    }

    if !paths.venv_dir.exists() {
        progress_callback(BootstrapProgress::CreatingVenv);
        create_venv(&paths).await?;
    }

    progress_callback(BootstrapProgress::InstallingRequirements);
    install_requirements(&paths, &config.requirements_path).await?;

    progress_callback(BootstrapProgress::Ready);
    info!("Python runtime ready at {:?}", paths.venv_python);

    Ok(paths)
}

/// Download URL for the python-build-standalone `install_only` archive.
fn download_url() -> Result<String, PythonBootstrapError> {
    let (os, arch) = platform_target()?;

    let filename = format!(
        "cpython-{PYTHON_VERSION}+{PYTHON_BUILD_STANDALONE_RELEASE}-{arch}-{os}-install_only.tar.gz"
    );

    Ok(format!(
        "https://github.com/astral-sh/python-build-standalone/releases/download/{PYTHON_BUILD_STANDALONE_RELEASE}/{filename}"
    ))
}

fn platform_target() -> Result<(&'static str, &'static str), PythonBootstrapError> {
    let os = if cfg!(target_os = "linux") {
        "unknown-linux-gnu"
    } else if cfg!(target_os = "macos") {
        "apple-darwin"
    } else if cfg!(target_os = "windows") {
        "pc-windows-msvc"
    } else {
        return Err(PythonBootstrapError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ));
    };

    let arch = if cfg!(target_arch = "x86_64") {
        "x86_64"
    } else if cfg!(target_arch = "aarch64") {
        "aarch64"
    } else {
        return Err(PythonBootstrapError::UnsupportedPlatform(
            std::env::consts::ARCH.to_string(),
        ));
    };

    Ok((os, arch))
}

async fn download_python(
    paths: &RuntimePaths,
    progress: impl Fn(u8),
) -> Result<(), PythonBootstrapError> {
    let url = download_url()?;
    info!("Downloading Python from: {}", url);

    let response = reqwest::Client::new().get(&url).send().await?;

    if !response.status().is_success() {
        return Err(PythonBootstrapError::Download(format!(
            "HTTP {}: {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let archive_path = paths.root.join("cpython.tar.gz");

    let mut file = fs::File::create(&archive_path)?;
    let mut downloaded: u64 = 0;

    use futures_util::StreamExt;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        if total_size > 0 {
            progress(((downloaded as f64 / total_size as f64) * 100.0) as u8);
        }
    }

    info!("Extracting Python archive...");
    extract_tarball(&archive_path, &paths.root)?;

    // The archive unpacks into a 'python' subdirectory matching
    // paths.python_dir; anything else means a layout change upstream.
    if !paths.python_exe.exists() {
        return Err(PythonBootstrapError::Extract(format!(
            "archive did not produce {}",
            paths.python_exe.display()
        )));
    }

    fs::remove_file(&archive_path).ok();

    Ok(())
}

fn extract_tarball(archive_path: &Path, dest: &Path) -> Result<(), PythonBootstrapError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    archive
        .unpack(dest)
        .map_err(|e| PythonBootstrapError::Extract(e.to_string()))?;

    Ok(())
}

async fn create_venv(paths: &RuntimePaths) -> Result<(), PythonBootstrapError> {
    info!("Creating virtual environment at {:?}", paths.venv_dir);

    let output = Command::new(&paths.python_exe)
        .arg("-m")
        .arg("venv")
        .arg(&paths.venv_dir)
        .output()
        .await
        .map_err(|e| PythonBootstrapError::CreateVenv(e.to_string()))?;

    if !output.status.success() {
        return Err(PythonBootstrapError::CreateVenv(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    Ok(())
}

async fn install_requirements(
    paths: &RuntimePaths,
    requirements_path: &Path,
) -> Result<(), PythonBootstrapError> {
    info!("Installing analysis requirements from {:?}", requirements_path);

    // Upgrade pip first; failure here is non-fatal.
    let output = Command::new(&paths.venv_python)
        .args(["-m", "pip", "install", "--upgrade", "pip"])
        .output()
        .await
        .map_err(|e| PythonBootstrapError::InstallRequirements(e.to_string()))?;

    if !output.status.success() {
        warn!(
            "pip upgrade failed (non-fatal): {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let output = Command::new(&paths.venv_pip)
        .arg("install")
        .arg("-r")
        .arg(requirements_path)
        .arg("--no-warn-script-location")
        .output()
        .await
        .map_err(|e| PythonBootstrapError::InstallRequirements(e.to_string()))?;

    if !output.status.success() {
        return Err(PythonBootstrapError::InstallRequirements(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    debug!(
        "pip install output: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    Ok(())
}
