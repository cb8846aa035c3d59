// ABOUTME: Identity and host introspection for a runtime adapter.
// ABOUTME: Engine id, control endpoint, engine info and host address lookup.

use super::sealed::Sealed;
use super::shared_types::RuntimeInfo;
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;
use std::net::IpAddr;

/// Which engine an adapter talks to and how to reach it.
#[async_trait]
pub trait RuntimeIdentity: Sealed + Send + Sync {
    /// Stable lowercase engine identifier (`docker`, `podman`, ...).
    fn id(&self) -> &'static str;

    /// Address of the engine's control endpoint.
    fn host(&self) -> String;

    /// Local control socket used, for diagnostics.
    fn runtime_path(&self) -> String;

    /// Fetch a fresh snapshot of the engine's metadata.
    ///
    /// Fails with `EngineUnavailable` when the endpoint cannot be reached.
    async fn info(&self, ctx: &OpContext) -> Result<RuntimeInfo, RuntimeError>;

    /// Address of the host as seen from inside `network`.
    ///
    /// Fails with `NotFound` for the gateway when the network has none.
    async fn host_ip(&self, ctx: &OpContext, network: &str) -> Result<IpAddr, RuntimeError>;
}
