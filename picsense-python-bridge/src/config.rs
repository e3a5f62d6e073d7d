//! Bridge configuration.
//!
//! Paths the bridge needs to find its bundled Python assets: the data
//! directory the isolated runtime is installed under, the requirements file
//! for the analysis dependencies, and the directory holding the analysis
//! modules themselves (`analyze_layout.py`, `color_style_infer.py`,
//! `instagram_downloader.py`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading a config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the Python bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory the isolated Python runtime is installed under.
    pub data_dir: PathBuf,
    /// Requirements file installed into the venv during bootstrap.
    pub requirements_path: PathBuf,
    /// Directory containing the bundled analysis modules, added to the
    /// interpreter's module search path for every invocation.
    pub modules_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            requirements_path: data_dir.join("python").join("requirements.txt"),
            modules_dir: data_dir.join("python").join("modules"),
            data_dir,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "PicSense", "picsense")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".picsense"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_rooted_in_data_dir() {
        let config = BridgeConfig::default();
        assert!(config.requirements_path.starts_with(&config.data_dir));
        assert!(config.modules_dir.starts_with(&config.data_dir));
    }

    #[test]
    fn load_overrides_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "data_dir = \"/opt/picsense\"").unwrap();
        writeln!(file, "modules_dir = \"/opt/picsense/modules\"").unwrap();
        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/opt/picsense"));
        assert_eq!(config.modules_dir, PathBuf::from("/opt/picsense/modules"));
        // Unspecified keys keep their defaults.
        assert!(config.requirements_path.ends_with("requirements.txt"));
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "data_dir = [not toml").unwrap();
        assert!(matches!(
            BridgeConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
