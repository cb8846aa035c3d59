// ABOUTME: Domain model passed across the runtime contract boundary.
// ABOUTME: Node, ClusterNetwork, Volume, RuntimeInfo, log options and stream types.

use crate::runtime::error::RuntimeError;
use crate::types::{ContainerId, NetworkId, NodeName};
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt};

/// Label scoping every object this tool manages.
pub const LABEL_APP: &str = "app";
/// Value of [`LABEL_APP`] on managed objects.
pub const APP_NAME: &str = "kubeling";
/// Label carrying a node's [`Role`].
pub const LABEL_ROLE: &str = "kubeling.role";

/// Path of the admin kubeconfig written by the server process inside a node.
pub const KUBECONFIG_PATH: &str = "/output/kubeconfig.yaml";

pub type Labels = HashMap<String, String>;

/// Finite, non-restartable stream of bytes produced by the engine.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

/// Caller-supplied input for an in-node command.
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Pull-based buffered reader over an engine stream.
pub type BoxBufReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Future resolving to the exit code of a finished exec.
pub type ExitFuture = Pin<Box<dyn Future<Output = Result<i64, RuntimeError>> + Send>>;

/// Labels every managed object carries.
pub fn scope_labels() -> Labels {
    HashMap::from([(LABEL_APP.to_string(), APP_NAME.to_string())])
}

// =============================================================================
// Nodes
// =============================================================================

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Agent,
    LoadBalancer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Agent => "agent",
            Role::LoadBalancer => "loadbalancer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown node role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Role::Server),
            "agent" => Ok(Role::Agent),
            "loadbalancer" => Ok(Role::LoadBalancer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Engine-side state of a node. Observed, never set by callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub running: bool,
    /// Engine status word (`created`, `running`, `exited`, ...).
    pub status: String,
    /// Start timestamp as reported by the engine.
    pub started: Option<String>,
}

/// Result of `get_node_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub running: bool,
    pub status: String,
}

/// Port published from a node to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// One container acting as a cluster member.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: NodeName,
    pub role: Role,
    pub image: String,
    /// Engine labels. Scope and role labels are added on creation.
    pub labels: Labels,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub args: Vec<String>,
    /// Bind or volume mounts in `source:target[:options]` form.
    pub volumes: Vec<String>,
    /// Networks to join; the first one is the primary network.
    pub networks: Vec<String>,
    pub ports: Vec<PortMapping>,
    /// `host:ip` entries appended to `/etc/hosts`.
    pub extra_hosts: Vec<String>,
    /// Restart the node unless it was stopped explicitly.
    pub restart: bool,
    /// Memory limit in bytes.
    pub memory: Option<u64>,
    pub state: NodeState,
    /// Address on the primary network, when known.
    pub ip: Option<IpAddr>,
    pub id: Option<ContainerId>,
}

impl Node {
    pub fn new(name: NodeName, role: Role, image: impl Into<String>) -> Self {
        Self {
            name,
            role,
            image: image.into(),
            labels: Labels::new(),
            env: Vec::new(),
            cmd: Vec::new(),
            args: Vec::new(),
            volumes: Vec::new(),
            networks: Vec::new(),
            ports: Vec::new(),
            extra_hosts: Vec::new(),
            restart: false,
            memory: None,
            state: NodeState::default(),
            ip: None,
            id: None,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Labels as written to the engine: user labels plus scope and role.
    pub fn engine_labels(&self) -> Labels {
        let mut labels = self.labels.clone();
        labels.extend(scope_labels());
        labels.insert(LABEL_ROLE.to_string(), self.role.to_string());
        labels
    }
}

/// Read back a node's role from its engine labels.
pub fn role_from_labels(labels: &Labels) -> Option<Role> {
    labels.get(LABEL_ROLE).and_then(|r| r.parse().ok())
}

/// Whether engine labels put an object inside this tool's scope.
pub fn in_scope(labels: &Labels) -> bool {
    labels.get(LABEL_APP).map(String::as_str) == Some(APP_NAME)
}

/// Whether `labels` contains every pair of `wanted`.
pub fn labels_match(labels: &Labels, wanted: &Labels) -> bool {
    wanted.iter().all(|(k, v)| labels.get(k) == Some(v))
}

// =============================================================================
// Networks
// =============================================================================

/// A node's membership in a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMember {
    pub name: String,
    pub ip: Option<IpAddr>,
}

/// Isolated network joining a cluster's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNetwork {
    pub name: String,
    pub id: Option<NetworkId>,
    /// Network existed before this tool touched it (no scope label).
    pub external: bool,
    /// CIDR prefix, e.g. `172.28.0.0/16`.
    pub subnet: Option<String>,
    pub gateway: Option<IpAddr>,
    pub labels: Labels,
    pub members: Vec<NetworkMember>,
}

impl ClusterNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            external: false,
            subnet: None,
            gateway: None,
            labels: Labels::new(),
            members: Vec::new(),
        }
    }

    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    /// A requested network is satisfied by an existing one unless it pins a
    /// different subnet. Subnets compare by network address and prefix, so
    /// `172.28.5.9/16` matches `172.28.0.0/16`.
    pub fn is_compatible_with(&self, existing: &ClusterNetwork) -> bool {
        match (&self.subnet, &existing.subnet) {
            (Some(wanted), Some(have)) => match (canonical_cidr(wanted), canonical_cidr(have)) {
                (Some(wanted), Some(have)) => wanted == have,
                _ => wanted.trim() == have.trim(),
            },
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Parse `addr/prefix` and mask the address down to its network address.
pub fn canonical_cidr(cidr: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = cidr.trim().split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    match addr {
        IpAddr::V4(v4) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            Some((IpAddr::V4((u32::from(v4) & mask).into()), prefix))
        }
        IpAddr::V6(v6) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            Some((IpAddr::V6((u128::from(v6) & mask).into()), prefix))
        }
        _ => None,
    }
}

// =============================================================================
// Volumes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub labels: Labels,
    /// Host path backing the volume, when the engine reports one.
    pub mountpoint: Option<String>,
}

// =============================================================================
// Runtime metadata and I/O options
// =============================================================================

/// Snapshot of the active engine, fetched on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RuntimeInfo {
    pub name: String,
    pub endpoint: String,
    pub version: String,
    pub os_type: String,
    pub os: String,
    pub arch: String,
    pub cgroup_version: String,
    pub cgroup_driver: String,
    pub storage_driver: String,
}

/// Options for `get_node_logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep the stream open for new output.
    pub follow: bool,
    /// Only the last N lines.
    pub tail: Option<u64>,
    /// Prefix each line with its timestamp.
    pub timestamps: bool,
}

impl LogOptions {
    pub fn follow() -> Self {
        Self {
            follow: true,
            ..Default::default()
        }
    }

    pub fn tail(n: u64) -> Self {
        Self {
            tail: Some(n),
            ..Default::default()
        }
    }
}

/// Output of a command still running inside a node.
///
/// Read combined stdout/stderr through [`ExecLogs::reader`] while the command
/// runs, then call [`ExecLogs::wait`] for the outcome. Dropping the value
/// releases the engine stream.
pub struct ExecLogs {
    node: String,
    cmd: Vec<String>,
    reader: BoxBufReader,
    exit: ExitFuture,
}

impl ExecLogs {
    pub fn new(node: String, cmd: Vec<String>, reader: BoxBufReader, exit: ExitFuture) -> Self {
        Self {
            node,
            cmd,
            reader,
            exit,
        }
    }

    pub fn reader(&mut self) -> &mut BoxBufReader {
        &mut self.reader
    }

    /// Drain unread output and wait for the command to finish.
    ///
    /// A non-zero exit becomes [`RuntimeError::CommandFailed`] carrying the
    /// output that was still unread.
    pub async fn wait(mut self) -> Result<(), RuntimeError> {
        let mut rest = Vec::new();
        self.reader
            .read_to_end(&mut rest)
            .await
            .map_err(|e| RuntimeError::engine("exec", self.node.clone(), e))?;

        let exit_code = self.exit.await?;
        if exit_code != 0 {
            return Err(RuntimeError::CommandFailed {
                node: self.node,
                cmd: self.cmd,
                exit_code,
                output: String::from_utf8_lossy(&rest).into_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ExecLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecLogs")
            .field("node", &self.node)
            .field("cmd", &self.cmd)
            .finish_non_exhaustive()
    }
}
