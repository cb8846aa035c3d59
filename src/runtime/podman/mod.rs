// ABOUTME: Podman adapter over the Docker-compatible API of the Podman service.
// ABOUTME: Wraps the Docker adapter and overrides identity and image pulls.

mod pull;

use crate::runtime::context::OpContext;
use crate::runtime::docker::DockerRuntime;
use crate::runtime::error::RuntimeError;
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ByteStream, ClusterNetwork, ExecLogs, ExecOps, FileOps, ImageOps, InputStream, Labels,
    LogOps, LogOptions, NetworkOps, Node, NodeOps, NodeStatus, RuntimeIdentity, RuntimeInfo,
    Volume, VolumeOps,
};
use crate::types::ContainerId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Adapter for a Podman service socket.
///
/// Podman serves the Docker Engine API on the same socket as its native
/// libpod API. Operations with identical semantics on both engines go
/// through the wrapped Docker adapter.
pub struct PodmanRuntime {
    inner: DockerRuntime,
}

impl PodmanRuntime {
    pub fn new(inner: DockerRuntime) -> Self {
        Self { inner }
    }

    pub fn connect(socket: &str, timeout: Duration) -> Result<Self, RuntimeError> {
        Ok(Self::new(DockerRuntime::connect(socket, timeout)?))
    }
}

/// Whether `image` is among the local tags, allowing for the registry
/// prefixes and default tag Podman adds.
fn image_present(local: &[String], image: &str) -> bool {
    let last = image.rsplit('/').next().unwrap_or(image);
    let wanted = if last.contains(':') || last.contains('@') {
        image.to_string()
    } else {
        format!("{image}:latest")
    };

    local.iter().any(|tag| {
        let short = tag
            .strip_prefix("docker.io/library/")
            .or_else(|| tag.strip_prefix("docker.io/"))
            .or_else(|| tag.strip_prefix("localhost/"))
            .unwrap_or(tag);
        tag == &wanted || short == wanted
    })
}

impl Sealed for PodmanRuntime {}

#[async_trait]
impl RuntimeIdentity for PodmanRuntime {
    fn id(&self) -> &'static str {
        "podman"
    }

    fn host(&self) -> String {
        format!("unix://{}", self.inner.socket())
    }

    fn runtime_path(&self) -> String {
        self.inner.socket().to_string()
    }

    async fn info(&self, ctx: &OpContext) -> Result<RuntimeInfo, RuntimeError> {
        let info = self.inner.info(ctx).await?;
        Ok(RuntimeInfo {
            name: self.id().to_string(),
            endpoint: self.host(),
            ..info
        })
    }

    async fn host_ip(&self, ctx: &OpContext, network: &str) -> Result<IpAddr, RuntimeError> {
        self.inner.host_ip(ctx, network).await
    }
}

#[async_trait]
impl ImageOps for PodmanRuntime {
    async fn get_images(&self, ctx: &OpContext) -> Result<Vec<String>, RuntimeError> {
        self.inner.get_images(ctx).await
    }

    async fn pull_image(&self, ctx: &OpContext, image: &str) -> Result<(), RuntimeError> {
        debug!(image = %image, runtime = "podman", "pulling image via libpod");
        ctx.run("pull image", pull::pull(self.inner.socket(), image)).await
    }

    async fn get_image_stream(
        &self,
        ctx: &OpContext,
        images: &[String],
    ) -> Result<ByteStream, RuntimeError> {
        self.inner.get_image_stream(ctx, images).await
    }
}

#[async_trait]
impl NodeOps for PodmanRuntime {
    async fn create_node(&self, ctx: &OpContext, node: &Node) -> Result<ContainerId, RuntimeError> {
        // The Docker adapter pulls through its own client on a missing image;
        // pulling first keeps insecure local registries usable.
        if !image_present(&self.get_images(ctx).await?, &node.image) {
            self.pull_image(ctx, &node.image).await?;
        }
        self.inner.create_node(ctx, node).await
    }

    async fn delete_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inner.delete_node(ctx, name).await
    }

    async fn rename_node(
        &self,
        ctx: &OpContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError> {
        self.inner.rename_node(ctx, name, new_name).await
    }

    async fn start_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inner.start_node(ctx, name).await
    }

    async fn stop_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inner.stop_node(ctx, name).await
    }

    async fn get_node(&self, ctx: &OpContext, name: &str) -> Result<Node, RuntimeError> {
        self.inner.get_node(ctx, name).await
    }

    async fn get_nodes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Node>, RuntimeError> {
        self.inner.get_nodes_by_label(ctx, labels).await
    }

    async fn get_node_status(&self, ctx: &OpContext, name: &str) -> Result<NodeStatus, RuntimeError> {
        self.inner.get_node_status(ctx, name).await
    }
}

#[async_trait]
impl NetworkOps for PodmanRuntime {
    async fn create_network_if_not_present(
        &self,
        ctx: &OpContext,
        network: &ClusterNetwork,
    ) -> Result<(ClusterNetwork, bool), RuntimeError> {
        self.inner.create_network_if_not_present(ctx, network).await
    }

    async fn delete_network(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inner.delete_network(ctx, name).await
    }

    async fn get_network(&self, ctx: &OpContext, name: &str) -> Result<ClusterNetwork, RuntimeError> {
        self.inner.get_network(ctx, name).await
    }

    async fn get_nodes_in_network(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Vec<Node>, RuntimeError> {
        self.inner.get_nodes_in_network(ctx, name).await
    }

    async fn connect_node_to_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        self.inner.connect_node_to_network(ctx, node, network).await
    }

    async fn disconnect_node_from_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        self.inner.disconnect_node_from_network(ctx, node, network).await
    }
}

#[async_trait]
impl VolumeOps for PodmanRuntime {
    async fn create_volume(
        &self,
        ctx: &OpContext,
        name: &str,
        labels: &Labels,
    ) -> Result<Volume, RuntimeError> {
        self.inner.create_volume(ctx, name, labels).await
    }

    async fn delete_volume(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inner.delete_volume(ctx, name).await
    }

    async fn get_volume(&self, ctx: &OpContext, name: &str) -> Result<Volume, RuntimeError> {
        self.inner.get_volume(ctx, name).await
    }

    async fn get_volumes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Volume>, RuntimeError> {
        self.inner.get_volumes_by_label(ctx, labels).await
    }
}

#[async_trait]
impl ExecOps for PodmanRuntime {
    async fn exec_in_node(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<(), RuntimeError> {
        self.inner.exec_in_node(ctx, node, cmd).await
    }

    async fn exec_in_node_with_stdin(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        stdin: InputStream,
    ) -> Result<(), RuntimeError> {
        self.inner.exec_in_node_with_stdin(ctx, node, cmd, stdin).await
    }

    async fn exec_in_node_get_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<ExecLogs, RuntimeError> {
        self.inner.exec_in_node_get_logs(ctx, node, cmd).await
    }
}

#[async_trait]
impl LogOps for PodmanRuntime {
    async fn get_node_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        since: Option<DateTime<Utc>>,
        opts: &LogOptions,
    ) -> Result<ByteStream, RuntimeError> {
        self.inner.get_node_logs(ctx, node, since, opts).await
    }
}

#[async_trait]
impl FileOps for PodmanRuntime {
    async fn copy_to_node(
        &self,
        ctx: &OpContext,
        source: &Path,
        destination: &str,
        node: &str,
    ) -> Result<(), RuntimeError> {
        self.inner.copy_to_node(ctx, source, destination, node).await
    }

    async fn write_to_node(
        &self,
        ctx: &OpContext,
        content: &[u8],
        destination: &str,
        mode: u32,
        node: &str,
    ) -> Result<(), RuntimeError> {
        self.inner.write_to_node(ctx, content, destination, mode, node).await
    }

    async fn read_from_node(
        &self,
        ctx: &OpContext,
        path: &str,
        node: &str,
    ) -> Result<ByteStream, RuntimeError> {
        self.inner.read_from_node(ctx, path, node).await
    }

    async fn get_kubeconfig(&self, ctx: &OpContext, node: &str) -> Result<ByteStream, RuntimeError> {
        self.inner.get_kubeconfig(ctx, node).await
    }
}
