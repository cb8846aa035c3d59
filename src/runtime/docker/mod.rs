// ABOUTME: Docker Engine adapter built on bollard.
// ABOUTME: Reference implementation of the runtime contract; Podman reuses it.

mod errors;
mod exec;
mod files;
mod image;
mod logs;
mod network;
mod node;
mod volume;

use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::locks::KeyedLocks;
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{ByteStream, RuntimeIdentity, RuntimeInfo};
use async_trait::async_trait;
use bollard::Docker;
use errors::map_error;
use futures::StreamExt;
use std::net::IpAddr;
use std::time::Duration;

/// Adapter speaking the Docker Engine API over a local unix socket.
///
/// Cheap to share: the bollard client is reference counted and the only
/// mutable state is the table of per-name locks.
pub struct DockerRuntime {
    client: Docker,
    socket: String,
    locks: KeyedLocks,
}

impl DockerRuntime {
    pub fn new(client: Docker, socket: impl Into<String>) -> Self {
        Self {
            client,
            socket: socket.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Build a client for the engine socket at `socket`.
    ///
    /// No request is made here; an unreachable engine surfaces on first use.
    pub fn connect(socket: &str, timeout: Duration) -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_unix(
            socket,
            timeout.as_secs().max(1),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| RuntimeError::EngineUnavailable {
            endpoint: socket.to_string(),
            source: Box::new(e),
        })?;
        Ok(Self::new(client, socket))
    }

    pub(crate) fn socket(&self) -> &str {
        &self.socket
    }

    fn map_err(
        &self,
        op: &'static str,
        kind: ResourceKind,
        name: &str,
    ) -> impl FnOnce(bollard::errors::Error) -> RuntimeError + '_ {
        let name = name.to_string();
        move |e| map_error(e, &self.socket, op, kind, &name)
    }
}

fn node_key(name: &str) -> String {
    format!("node/{name}")
}

fn network_key(name: &str) -> String {
    format!("network/{name}")
}

/// Wait for the first chunk of an engine stream.
///
/// Engine streams only issue their request when polled; priming makes a
/// missing target fail the call itself rather than the first read.
pub(super) async fn prime(mut stream: ByteStream) -> Result<ByteStream, RuntimeError> {
    match stream.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(first)) => Ok(Box::pin(
            futures::stream::once(futures::future::ready(Ok(first))).chain(stream),
        )),
        None => Ok(Box::pin(futures::stream::empty())),
    }
}

impl Sealed for DockerRuntime {}

#[async_trait]
impl RuntimeIdentity for DockerRuntime {
    fn id(&self) -> &'static str {
        "docker"
    }

    fn host(&self) -> String {
        format!("unix://{}", self.socket)
    }

    fn runtime_path(&self) -> String {
        self.socket.clone()
    }

    async fn info(&self, ctx: &OpContext) -> Result<RuntimeInfo, RuntimeError> {
        let info = ctx
            .run("info", async {
                self.client.info().await.map_err(|e| RuntimeError::EngineUnavailable {
                    endpoint: self.socket.clone(),
                    source: Box::new(e),
                })
            })
            .await?;

        Ok(RuntimeInfo {
            name: self.id().to_string(),
            endpoint: self.host(),
            version: info.server_version.unwrap_or_default(),
            os_type: info.os_type.unwrap_or_default(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
            cgroup_version: info.cgroup_version.map(|v| v.to_string()).unwrap_or_default(),
            cgroup_driver: info.cgroup_driver.map(|v| v.to_string()).unwrap_or_default(),
            storage_driver: info.driver.unwrap_or_default(),
        })
    }

    async fn host_ip(&self, ctx: &OpContext, network: &str) -> Result<IpAddr, RuntimeError> {
        let net = self.inspect_network(ctx, network).await?;
        net.gateway
            .ok_or_else(|| RuntimeError::not_found(ResourceKind::Gateway, network))
    }
}
