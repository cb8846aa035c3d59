// ABOUTME: Network lifecycle operations for runtime adapters.
// ABOUTME: Ensure, delete and inspect networks; attach and detach nodes.

use super::sealed::Sealed;
use super::shared_types::{ClusterNetwork, Node};
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;

/// Network lifecycle and membership.
#[async_trait]
pub trait NetworkOps: Sealed + Send + Sync {
    /// Make sure a network named `network.name` exists.
    ///
    /// Returns the network and whether it already existed. An existing network
    /// whose subnet conflicts with the requested one fails with
    /// `AlreadyExists`.
    async fn create_network_if_not_present(
        &self,
        ctx: &OpContext,
        network: &ClusterNetwork,
    ) -> Result<(ClusterNetwork, bool), RuntimeError>;

    /// Remove a managed network. Absent networks are not an error; networks
    /// without the scope label are left in place.
    async fn delete_network(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError>;

    async fn get_network(&self, ctx: &OpContext, name: &str)
    -> Result<ClusterNetwork, RuntimeError>;

    async fn get_nodes_in_network(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Vec<Node>, RuntimeError>;

    /// Attach a node. Already attached succeeds without effect.
    async fn connect_node_to_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError>;

    /// Detach a node. Already detached succeeds without effect.
    async fn disconnect_node_from_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError>;
}
