// ABOUTME: Maps a configured engine identifier to the one adapter used per invocation.
// ABOUTME: Unifies detection and connection failures behind a SNAFU error.

use super::detection::{self, DetectionError};
use super::docker::DockerRuntime;
use super::error::RuntimeError;
use super::memory::MemoryRuntime;
use super::podman::PodmanRuntime;
use super::traits::Runtime;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default engine request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Docker,
    Podman,
    Memory,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
            EngineKind::Memory => "memory",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(EngineKind::Docker),
            "podman" => Ok(EngineKind::Podman),
            "memory" => Ok(EngineKind::Memory),
            _ => UnknownRuntimeSnafu { name: s }.fail(),
        }
    }
}

/// Parse a configured identifier where `auto` (or nothing) means detect.
pub fn parse_runtime(s: &str) -> Result<Option<EngineKind>, SelectError> {
    match s.trim() {
        "" | "auto" => Ok(None),
        other => other.parse().map(Some),
    }
}

/// What the selector needs to build an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Explicit engine; `None` auto-detects.
    pub runtime: Option<EngineKind>,
    /// Explicit socket path or `unix://` URL.
    pub socket: Option<String>,
    pub timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            socket: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Unified selection error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SelectError {
    #[snafu(display("unknown runtime `{name}` (expected docker, podman, memory or auto)"))]
    UnknownRuntime { name: String },

    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("runtime connection failed: {source}"))]
    Connection { source: RuntimeError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectErrorKind {
    /// The identifier names no supported engine.
    UnknownRuntime,
    /// No engine socket found on the system.
    NoRuntimeFound,
    /// Endpoint is not a unix socket.
    UnsupportedEndpoint,
    /// Client construction for the socket failed.
    ConnectionFailed,
}

impl SelectError {
    pub fn kind(&self) -> SelectErrorKind {
        match self {
            SelectError::UnknownRuntime { .. } => SelectErrorKind::UnknownRuntime,
            SelectError::Detection { source } => match source {
                DetectionError::NoRuntimeFound => SelectErrorKind::NoRuntimeFound,
                DetectionError::UnsupportedEndpoint(_) => SelectErrorKind::UnsupportedEndpoint,
            },
            SelectError::Connection { .. } => SelectErrorKind::ConnectionFailed,
        }
    }
}

/// Guess the engine behind an explicitly configured socket.
fn kind_for_socket(socket: &str) -> EngineKind {
    if socket.contains("podman") {
        EngineKind::Podman
    } else {
        EngineKind::Docker
    }
}

/// Build the adapter for this invocation.
///
/// No engine request is made; an unreachable daemon surfaces on first use.
pub fn select_runtime(config: &RuntimeConfig) -> Result<Arc<dyn Runtime>, SelectError> {
    let explicit = config
        .socket
        .as_deref()
        .map(detection::socket_from_host)
        .transpose()
        .context(DetectionSnafu)?;

    let (kind, socket) = match (config.runtime, explicit) {
        (Some(EngineKind::Memory), _) => {
            info!(runtime = "memory", "selected in-memory runtime");
            return Ok(Arc::new(MemoryRuntime::new()));
        }
        (Some(kind), Some(socket)) => (kind, socket),
        (Some(kind), None) => (kind, detection::default_socket(kind).context(DetectionSnafu)?),
        (None, Some(socket)) => (kind_for_socket(&socket), socket),
        (None, None) => {
            let found = detection::detect_local().context(DetectionSnafu)?;
            (found.kind, found.socket)
        }
    };

    info!(runtime = %kind, socket = %socket, "selected container runtime");
    let runtime: Arc<dyn Runtime> = match kind {
        EngineKind::Podman => {
            Arc::new(PodmanRuntime::connect(&socket, config.timeout).context(ConnectionSnafu)?)
        }
        _ => Arc::new(DockerRuntime::connect(&socket, config.timeout).context(ConnectionSnafu)?),
    };
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::RuntimeIdentity;

    #[test]
    fn identifiers_parse_case_insensitively() {
        assert_eq!("Docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert_eq!("podman".parse::<EngineKind>().unwrap(), EngineKind::Podman);
        assert_eq!(parse_runtime("auto").unwrap(), None);
        assert_eq!(parse_runtime("memory").unwrap(), Some(EngineKind::Memory));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = "containerd".parse::<EngineKind>().unwrap_err();
        assert_eq!(err.kind(), SelectErrorKind::UnknownRuntime);
        assert!(err.to_string().contains("containerd"));
    }

    #[test]
    fn memory_needs_no_socket() {
        let config = RuntimeConfig {
            runtime: Some(EngineKind::Memory),
            ..Default::default()
        };
        assert_eq!(select_runtime(&config).unwrap().id(), "memory");
    }

    #[tokio::test]
    async fn explicit_socket_selects_by_path() {
        let config = RuntimeConfig {
            socket: Some("unix:///run/podman/podman.sock".into()),
            ..Default::default()
        };
        assert_eq!(select_runtime(&config).unwrap().id(), "podman");
    }

    #[test]
    fn tcp_socket_is_unsupported() {
        let config = RuntimeConfig {
            runtime: Some(EngineKind::Docker),
            socket: Some("tcp://127.0.0.1:2375".into()),
            ..Default::default()
        };
        let err = select_runtime(&config).err().unwrap();
        assert_eq!(err.kind(), SelectErrorKind::UnsupportedEndpoint);
    }
}
