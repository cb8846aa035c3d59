// ABOUTME: File transfer operations for runtime adapters.
// ABOUTME: Copy and write files into nodes, read them back, fetch the kubeconfig.

use super::sealed::Sealed;
use super::shared_types::ByteStream;
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;
use std::path::Path;

/// Files inside a node's filesystem. Destinations are absolute paths.
#[async_trait]
pub trait FileOps: Sealed + Send + Sync {
    /// Copy a local file to `destination`, keeping its permission bits.
    async fn copy_to_node(
        &self,
        ctx: &OpContext,
        source: &Path,
        destination: &str,
        node: &str,
    ) -> Result<(), RuntimeError>;

    /// Write `content` to `destination` with permission bits `mode`.
    async fn write_to_node(
        &self,
        ctx: &OpContext,
        content: &[u8],
        destination: &str,
        mode: u32,
        node: &str,
    ) -> Result<(), RuntimeError>;

    /// Stream a file's bytes. Fails with `NotFound` when the path is absent.
    async fn read_from_node(
        &self,
        ctx: &OpContext,
        path: &str,
        node: &str,
    ) -> Result<ByteStream, RuntimeError>;

    /// Stream the cluster admin kubeconfig generated inside a server node.
    async fn get_kubeconfig(&self, ctx: &OpContext, node: &str)
    -> Result<ByteStream, RuntimeError>;
}
