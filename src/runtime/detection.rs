// ABOUTME: Local engine socket discovery.
// ABOUTME: Honours CONTAINER_HOST/DOCKER_HOST, then probes Podman and Docker sockets.

use super::selector::EngineKind;
use std::path::Path;

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Error during runtime detection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("unsupported engine endpoint `{0}` (only unix sockets are supported)")]
    UnsupportedEndpoint(String),
}

/// An engine socket found on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub kind: EngineKind,
    pub socket: String,
}

/// Turn a `unix://` URL or bare absolute path into a socket path.
pub fn socket_from_host(host: &str) -> Result<String, DetectionError> {
    let path = host.strip_prefix("unix://").unwrap_or(host);
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Err(DetectionError::UnsupportedEndpoint(host.to_string()))
    }
}

fn env_host(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn host_var(kind: EngineKind) -> Option<&'static str> {
    match kind {
        EngineKind::Docker => Some("DOCKER_HOST"),
        EngineKind::Podman => Some("CONTAINER_HOST"),
        EngineKind::Memory => None,
    }
}

/// Socket to use for an explicitly requested engine.
///
/// The engine's host variable wins; otherwise the conventional socket path.
pub fn default_socket(kind: EngineKind) -> Result<String, DetectionError> {
    if let Some(host) = host_var(kind).and_then(env_host) {
        return socket_from_host(&host);
    }
    match kind {
        EngineKind::Docker => Ok(DOCKER_SOCKET.to_string()),
        EngineKind::Podman => Ok(rootless_podman()
            .filter(|s| Path::new(s).exists())
            .unwrap_or_else(|| ROOTFUL_PODMAN.to_string())),
        EngineKind::Memory => Err(DetectionError::NoRuntimeFound),
    }
}

/// Detect the engine on the local system.
///
/// Detection order:
/// 1. `CONTAINER_HOST` (Podman), then `DOCKER_HOST` (Docker)
/// 2. Rootless Podman socket (`$XDG_RUNTIME_DIR/podman/podman.sock`)
/// 3. Rootful Podman socket (`/run/podman/podman.sock`)
/// 4. Docker socket (`/var/run/docker.sock`)
pub fn detect_local() -> Result<Detected, DetectionError> {
    for kind in [EngineKind::Podman, EngineKind::Docker] {
        if let Some(host) = host_var(kind).and_then(env_host) {
            return Ok(Detected {
                kind,
                socket: socket_from_host(&host)?,
            });
        }
    }

    let candidates = [
        (EngineKind::Podman, rootless_podman()),
        (EngineKind::Podman, Some(ROOTFUL_PODMAN.to_string())),
        (EngineKind::Docker, Some(DOCKER_SOCKET.to_string())),
    ];
    candidates
        .into_iter()
        .find_map(|(kind, socket)| {
            socket
                .filter(|s| Path::new(s).exists())
                .map(|socket| Detected { kind, socket })
        })
        .ok_or(DetectionError::NoRuntimeFound)
}

fn rootless_podman() -> Option<String> {
    if let Some(dir) = env_host("XDG_RUNTIME_DIR") {
        return Some(format!("{dir}/podman/podman.sock"));
    }
    get_uid().map(|uid| format!("/run/user/{uid}/podman/podman.sock"))
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        // Fall back to reading /proc/self/status
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}
