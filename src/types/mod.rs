// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-tagged engine ids and the validated node name.

mod id;
mod node_name;

pub use id::{ContainerId, ContainerKind, EngineId, ExecId, ExecKind, IdKind, NetworkId, NetworkKind};
pub use node_name::{NodeName, NodeNameError};
