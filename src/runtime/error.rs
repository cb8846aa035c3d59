// ABOUTME: Shared error taxonomy for every runtime operation.
// ABOUTME: Adapters translate native engine failures into these kinds.

use std::fmt;

/// Boxed native cause kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kind of object an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Node,
    Network,
    Volume,
    Image,
    File,
    Gateway,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Node => "node",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Image => "image",
            ResourceKind::File => "file",
            ResourceKind::Gateway => "gateway",
        };
        f.write_str(s)
    }
}

/// Why an operation stopped before the engine answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Errors returned by runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("engine unavailable at {endpoint}: {source}")]
    EngineUnavailable {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("{op} {reason}")]
    Cancelled { op: &'static str, reason: CancelReason },

    #[error("command {cmd:?} in node {node} exited with code {exit_code}")]
    CommandFailed {
        node: String,
        cmd: Vec<String>,
        exit_code: i64,
        output: String,
    },

    #[error("{op} {target} failed: {source}")]
    Engine {
        op: &'static str,
        target: String,
        #[source]
        source: BoxError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    EngineUnavailable,
    Cancelled,
    CommandFailed,
    Engine,
}

impl RuntimeError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        RuntimeError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn engine(op: &'static str, target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RuntimeError::Engine {
            op,
            target: target.into(),
            source: source.into(),
        }
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::NotFound { .. } => ErrorKind::NotFound,
            RuntimeError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RuntimeError::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            RuntimeError::Cancelled { .. } => ErrorKind::Cancelled,
            RuntimeError::CommandFailed { .. } => ErrorKind::CommandFailed,
            RuntimeError::Engine { .. } => ErrorKind::Engine,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Conditions an orchestration layer may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EngineUnavailable | ErrorKind::Cancelled
        )
    }

    /// Exit code of a failed in-node command.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            RuntimeError::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
