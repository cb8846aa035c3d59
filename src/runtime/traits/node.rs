// ABOUTME: Node lifecycle operations for runtime adapters.
// ABOUTME: Create, delete, rename, start, stop and query cluster nodes.

use super::sealed::Sealed;
use super::shared_types::{Labels, Node, NodeStatus};
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use crate::types::ContainerId;
use async_trait::async_trait;

/// Node lifecycle.
///
/// Nodes are addressed by name. Only containers carrying the scope label are
/// nodes; anything else is invisible to these operations.
#[async_trait]
pub trait NodeOps: Sealed + Send + Sync {
    /// Create (but do not start) a node.
    ///
    /// A missing image is pulled once before retrying. Fails with
    /// `AlreadyExists` when the name is taken and with `NotFound` for the
    /// network when one of `node.networks` does not exist. On failure nothing
    /// is left behind.
    async fn create_node(&self, ctx: &OpContext, node: &Node)
    -> Result<ContainerId, RuntimeError>;

    /// Remove a node and its anonymous volumes. Absent nodes are not an error.
    async fn delete_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError>;

    async fn rename_node(
        &self,
        ctx: &OpContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError>;

    /// Start a node. Starting a running node succeeds without effect.
    async fn start_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError>;

    /// Stop a node. Stopping a stopped node succeeds without effect.
    async fn stop_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError>;

    /// Fails with `NotFound` when absent.
    async fn get_node(&self, ctx: &OpContext, name: &str) -> Result<Node, RuntimeError>;

    /// Nodes carrying every label in `labels`; empty when nothing matches.
    async fn get_nodes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Node>, RuntimeError>;

    /// Running flag plus engine status word. Never fails for an existing node.
    async fn get_node_status(&self, ctx: &OpContext, name: &str)
    -> Result<NodeStatus, RuntimeError>;
}
