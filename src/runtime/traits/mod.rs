// ABOUTME: Composable capability traits forming the runtime contract.
// ABOUTME: Identity, nodes, networks, volumes, exec, logs, files and images.

mod exec;
mod files;
mod identity;
mod image;
mod logs;
mod network;
mod node;
pub(crate) mod sealed;
mod shared_types;
mod volume;

pub use exec::ExecOps;
pub use files::FileOps;
pub use identity::RuntimeIdentity;
pub use image::ImageOps;
pub use logs::LogOps;
pub use network::NetworkOps;
pub use node::NodeOps;
pub use shared_types::*;
pub use volume::VolumeOps;

/// The full runtime contract.
///
/// Orchestration code depends on `dyn Runtime` (or `impl Runtime`) only.
/// Implemented automatically for every adapter that carries all capabilities.
pub trait Runtime:
    RuntimeIdentity + NodeOps + NetworkOps + VolumeOps + ExecOps + LogOps + FileOps + ImageOps
{
}

impl<T> Runtime for T where
    T: RuntimeIdentity + NodeOps + NetworkOps + VolumeOps + ExecOps + LogOps + FileOps + ImageOps
{
}
