// ABOUTME: Configuration types and parsing for kubeling.yml.
// ABOUTME: Handles file discovery, YAML parsing and environment overrides.

mod env;

pub use env::{ENV_RUNTIME, ENV_SOCKET, ENV_TIMEOUT};

use crate::error::{Error, Result};
use crate::runtime::{DEFAULT_TIMEOUT, RuntimeConfig, parse_runtime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "kubeling.yml";
pub const CONFIG_FILENAME_ALT: &str = "kubeling.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".kubeling/config.yml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `docker`, `podman`, `memory` or `auto`.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Engine socket path or `unix://` URL.
    #[serde(default)]
    pub socket: Option<String>,

    /// Engine request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_runtime() -> String {
    "auto".to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            socket: None,
            timeout: default_timeout(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// First config file present in `dir`, in discovery order.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load the config file in `dir`, or defaults when there is none.
    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// [`Config::discover`] followed by the `KUBELING_*` overrides.
    pub fn resolve(dir: &Path) -> Result<Self> {
        let mut config = Self::discover(dir)?;
        env::apply(&mut config)?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        parse_runtime(&self.runtime).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be greater than zero".into()));
        }
        Ok(())
    }

    /// Selector input for this configuration.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        Ok(RuntimeConfig {
            runtime: parse_runtime(&self.runtime)?,
            socket: self.socket.clone(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EngineKind;

    #[test]
    fn empty_file_means_defaults() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_yaml(
            "runtime: podman\nsocket: /run/podman/podman.sock\ntimeout: 30s\n",
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        let rc = config.runtime_config().unwrap();
        assert_eq!(rc.runtime, Some(EngineKind::Podman));
        assert_eq!(rc.socket.as_deref(), Some("/run/podman/podman.sock"));
    }

    #[test]
    fn unknown_runtime_is_invalid() {
        let err = Config::from_yaml("runtime: lxc\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml("runtim: docker\n").is_err());
    }
}
