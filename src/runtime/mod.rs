// ABOUTME: Container engine abstraction: contract, adapters and selection.
// ABOUTME: Orchestration code talks to engines only through `dyn Runtime`.

pub mod archive;
mod context;
mod detection;
mod docker;
mod error;
mod locks;
mod memory;
mod podman;
mod selector;
pub mod traits;

pub use context::OpContext;
pub use detection::{Detected, DetectionError, default_socket, detect_local, socket_from_host};
pub use docker::DockerRuntime;
pub use error::{BoxError, CancelReason, ErrorKind, ResourceKind, RuntimeError};
pub use memory::MemoryRuntime;
pub use podman::PodmanRuntime;
pub use selector::{
    DEFAULT_TIMEOUT, EngineKind, RuntimeConfig, SelectError, SelectErrorKind, parse_runtime,
    select_runtime,
};
pub use traits::Runtime;
