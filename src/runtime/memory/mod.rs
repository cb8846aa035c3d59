// ABOUTME: In-process engine adapter holding nodes, networks and volumes in memory.
// ABOUTME: Needs no daemon; backs the contract tests and dry runs.

mod exec;

use crate::runtime::archive;
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ByteStream, ClusterNetwork, ExecLogs, ExecOps, FileOps, ImageOps, InputStream,
    KUBECONFIG_PATH, Labels, LogOps, LogOptions, NetworkMember, NetworkOps, Node, NodeOps,
    NodeState, NodeStatus, RuntimeIdentity, RuntimeInfo, Volume, VolumeOps, canonical_cidr,
    in_scope,
    labels_match, scope_labels,
};
use crate::types::{ContainerId, NetworkId, NodeName};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Size of the chunks file and archive streams are cut into.
const CHUNK: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub(super) struct MemFile {
    pub content: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug)]
struct MemNode {
    node: Node,
    files: BTreeMap<String, MemFile>,
    logs: Vec<(DateTime<Utc>, String)>,
}

#[derive(Debug)]
struct MemNetwork {
    id: NetworkId,
    labels: Labels,
    subnet: Option<(Ipv4Addr, u8)>,
    gateway: Option<IpAddr>,
    members: BTreeMap<String, Option<IpAddr>>,
}

impl MemNetwork {
    fn view(&self, name: &str) -> ClusterNetwork {
        ClusterNetwork {
            name: name.to_string(),
            id: Some(self.id.clone()),
            external: !in_scope(&self.labels),
            subnet: self.subnet.map(|(base, prefix)| format!("{base}/{prefix}")),
            gateway: self.gateway,
            labels: self.labels.clone(),
            members: self
                .members
                .iter()
                .map(|(name, ip)| NetworkMember {
                    name: name.clone(),
                    ip: *ip,
                })
                .collect(),
        }
    }

    /// Lowest host address not held by the gateway or another member.
    ///
    /// Networks without a subnet hand out no addresses.
    fn free_address(&self, name: &str) -> Result<Option<IpAddr>, RuntimeError> {
        let Some((base, prefix)) = self.subnet else {
            return Ok(None);
        };
        let base = u32::from(base);
        // Network and broadcast addresses are excluded.
        let last_host = (1u64 << (32 - u32::from(prefix))) - 2;
        let taken: BTreeSet<IpAddr> = self
            .members
            .values()
            .flatten()
            .copied()
            .chain(self.gateway)
            .collect();
        (1..=last_host)
            .filter_map(|host| u32::try_from(host).ok())
            .filter_map(|host| base.checked_add(host))
            .map(|addr| IpAddr::V4(Ipv4Addr::from(addr)))
            .find(|ip| !taken.contains(ip))
            .map(Some)
            .ok_or_else(|| RuntimeError::engine("allocate address", name, "subnet exhausted"))
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, MemNode>,
    networks: BTreeMap<String, MemNetwork>,
    volumes: BTreeMap<String, Volume>,
    images: BTreeSet<String>,
    serial: u64,
}

impl State {
    fn next_id(&mut self) -> String {
        self.serial += 1;
        format!("{:064x}", self.serial)
    }

    fn node(&self, name: &str) -> Result<&MemNode, RuntimeError> {
        self.nodes
            .get(name)
            .ok_or_else(|| RuntimeError::not_found(ResourceKind::Node, name))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut MemNode, RuntimeError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| RuntimeError::not_found(ResourceKind::Node, name))
    }

    /// Snapshot of a node with its primary address filled in.
    fn node_view(&self, name: &str) -> Option<Node> {
        let mem = self.nodes.get(name)?;
        let mut node = mem.node.clone();
        node.ip = node
            .networks
            .first()
            .and_then(|n| self.networks.get(n))
            .and_then(|n| n.members.get(name).copied().flatten());
        Some(node)
    }

    fn join(&mut self, node: &str, network: &str) -> Result<(), RuntimeError> {
        let net = self
            .networks
            .get_mut(network)
            .ok_or_else(|| RuntimeError::not_found(ResourceKind::Network, network))?;
        if !net.members.contains_key(node) {
            let ip = net.free_address(network)?;
            net.members.insert(node.to_string(), ip);
        }
        Ok(())
    }

    fn overlaps_existing(&self, subnet: (Ipv4Addr, u8)) -> bool {
        self.networks
            .values()
            .filter_map(|n| n.subnet)
            .any(|existing| overlaps(existing, subnet))
    }

    /// First `10.89.N.0/24` clear of every existing network.
    fn free_auto_subnet(&self) -> Option<(Ipv4Addr, u8)> {
        (0..=u8::MAX)
            .map(|n| (Ipv4Addr::new(10, 89, n, 0), 24))
            .find(|candidate| !self.overlaps_existing(*candidate))
    }
}

/// IPv4 subnets with room for a gateway and at least one member.
fn parse_subnet(subnet: &str) -> Option<(Ipv4Addr, u8)> {
    match canonical_cidr(subnet)? {
        (IpAddr::V4(base), prefix) if prefix <= 30 => Some((base, prefix)),
        _ => None,
    }
}

fn overlaps((a, a_prefix): (Ipv4Addr, u8), (b, b_prefix): (Ipv4Addr, u8)) -> bool {
    let prefix = a_prefix.min(b_prefix);
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    u32::from(a) & mask == u32::from(b) & mask
}

fn chunked(data: Vec<u8>) -> Vec<Result<Bytes, RuntimeError>> {
    let data = Bytes::from(data);
    (0..data.len())
        .step_by(CHUNK)
        .map(|start| Ok(data.slice(start..(start + CHUNK).min(data.len()))))
        .collect()
}

fn check_outcome(node: &str, cmd: &[String], outcome: exec::Outcome) -> Result<(), RuntimeError> {
    if outcome.code != 0 {
        return Err(RuntimeError::CommandFailed {
            node: node.to_string(),
            cmd: cmd.to_vec(),
            exit_code: outcome.code,
            output: String::from_utf8_lossy(&outcome.output).into_owned(),
        });
    }
    Ok(())
}

/// Engine adapter keeping every object in process memory.
///
/// Each operation runs atomically under one lock, so operations on the same
/// name are trivially serializable. Images are "pulled" by recording them.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
    calls: AtomicU64,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a locally available image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.state.get_mut().images.insert(image.into());
        self
    }

    /// Seed a network this tool did not create, without a gateway.
    pub fn with_external_network(mut self, name: impl Into<String>) -> Self {
        let state = self.state.get_mut();
        let id = NetworkId::new(state.next_id());
        state.networks.insert(
            name.into(),
            MemNetwork {
                id,
                labels: Labels::new(),
                subnet: None,
                gateway: None,
                members: BTreeMap::new(),
            },
        );
        self
    }

    /// Number of operations that reached the engine state.
    pub fn engine_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn engine<T>(
        &self,
        ctx: &OpContext,
        op: &'static str,
        f: impl FnOnce(&mut State) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        ctx.check(op)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        f(&mut self.state.lock())
    }

    fn run_command(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        stdin: &[u8],
    ) -> Result<exec::Outcome, RuntimeError> {
        if cmd.is_empty() {
            return Err(RuntimeError::engine("exec", node, "empty command"));
        }
        debug!(node = %node, cmd = ?cmd, runtime = "memory", "exec in node");
        self.engine(ctx, "exec", |st| {
            let mem = st.node_mut(node)?;
            if !mem.node.state.running {
                return Err(RuntimeError::engine("exec", node, "node is not running"));
            }
            Ok(exec::interpret(cmd, stdin, &mut mem.files))
        })
    }
}

impl Sealed for MemoryRuntime {}

#[async_trait]
impl RuntimeIdentity for MemoryRuntime {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn host(&self) -> String {
        "memory://".to_string()
    }

    fn runtime_path(&self) -> String {
        String::new()
    }

    async fn info(&self, ctx: &OpContext) -> Result<RuntimeInfo, RuntimeError> {
        self.engine(ctx, "info", |_| {
            Ok(RuntimeInfo {
                name: self.id().to_string(),
                endpoint: self.host(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                os_type: "linux".to_string(),
                os: "in-memory".to_string(),
                arch: std::env::consts::ARCH.to_string(),
                cgroup_version: "2".to_string(),
                cgroup_driver: "none".to_string(),
                storage_driver: "memory".to_string(),
            })
        })
    }

    async fn host_ip(&self, ctx: &OpContext, network: &str) -> Result<IpAddr, RuntimeError> {
        self.engine(ctx, "host ip", |st| {
            let net = st
                .networks
                .get(network)
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Network, network))?;
            net.gateway
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Gateway, network))
        })
    }
}

#[async_trait]
impl NodeOps for MemoryRuntime {
    async fn create_node(&self, ctx: &OpContext, node: &Node) -> Result<ContainerId, RuntimeError> {
        let name = node.name.as_str();
        debug!(node = %name, runtime = "memory", image = %node.image, "creating node");
        self.engine(ctx, "create node", |st| {
            if st.nodes.contains_key(name) {
                return Err(RuntimeError::already_exists(ResourceKind::Node, name));
            }
            let mut networks: Vec<String> = Vec::with_capacity(node.networks.len());
            for network in &node.networks {
                if !networks.contains(network) {
                    networks.push(network.clone());
                }
            }
            // Every address is reserved before anything changes, so a failure leaves no trace.
            let mut addresses = Vec::with_capacity(networks.len());
            for network in &networks {
                let net = st
                    .networks
                    .get(network)
                    .ok_or_else(|| RuntimeError::not_found(ResourceKind::Network, network))?;
                addresses.push(net.free_address(network)?);
            }
            st.images.insert(node.image.clone());

            let id = ContainerId::new(st.next_id());
            let mut stored = node.clone();
            stored.labels = node.engine_labels();
            stored.networks = networks;
            stored.state = NodeState {
                running: false,
                status: "created".to_string(),
                started: None,
            };
            stored.ip = None;
            stored.id = Some(id.clone());

            for (network, ip) in stored.networks.iter().zip(addresses) {
                if let Some(net) = st.networks.get_mut(network) {
                    net.members.insert(name.to_string(), ip);
                }
            }
            st.nodes.insert(
                name.to_string(),
                MemNode {
                    node: stored,
                    files: BTreeMap::new(),
                    logs: Vec::new(),
                },
            );
            Ok(id)
        })
    }

    async fn delete_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.engine(ctx, "delete node", |st| {
            if st.nodes.remove(name).is_some() {
                debug!(node = %name, runtime = "memory", "deleted node");
                for net in st.networks.values_mut() {
                    net.members.remove(name);
                }
            }
            Ok(())
        })
    }

    async fn rename_node(
        &self,
        ctx: &OpContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError> {
        let renamed =
            NodeName::new(new_name).map_err(|e| RuntimeError::engine("rename", new_name, e))?;
        self.engine(ctx, "rename node", |st| {
            st.node(name)?;
            if name == new_name {
                return Ok(());
            }
            if st.nodes.contains_key(new_name) {
                return Err(RuntimeError::already_exists(ResourceKind::Node, new_name));
            }

            let Some(mut mem) = st.nodes.remove(name) else {
                return Err(RuntimeError::not_found(ResourceKind::Node, name));
            };
            mem.node.name = renamed;
            for net in st.networks.values_mut() {
                if let Some(ip) = net.members.remove(name) {
                    net.members.insert(new_name.to_string(), ip);
                }
            }
            st.nodes.insert(new_name.to_string(), mem);
            Ok(())
        })
    }

    async fn start_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.engine(ctx, "start node", |st| {
            let mem = st.node_mut(name)?;
            if !mem.node.state.running {
                let now = Utc::now();
                mem.node.state = NodeState {
                    running: true,
                    status: "running".to_string(),
                    started: Some(now.to_rfc3339()),
                };
                mem.logs.push((now, format!("node {name} started")));
            }
            Ok(())
        })
    }

    async fn stop_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.engine(ctx, "stop node", |st| {
            let mem = st.node_mut(name)?;
            if mem.node.state.running {
                mem.node.state.running = false;
                mem.node.state.status = "exited".to_string();
                mem.logs.push((Utc::now(), format!("node {name} stopped")));
            }
            Ok(())
        })
    }

    async fn get_node(&self, ctx: &OpContext, name: &str) -> Result<Node, RuntimeError> {
        self.engine(ctx, "get node", |st| {
            st.node_view(name)
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Node, name))
        })
    }

    async fn get_nodes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Node>, RuntimeError> {
        self.engine(ctx, "list nodes", |st| {
            Ok(st
                .nodes
                .iter()
                .filter(|(_, mem)| labels_match(&mem.node.labels, labels))
                .filter_map(|(name, _)| st.node_view(name))
                .collect())
        })
    }

    async fn get_node_status(&self, ctx: &OpContext, name: &str) -> Result<NodeStatus, RuntimeError> {
        self.engine(ctx, "get node status", |st| {
            let state = &st.node(name)?.node.state;
            Ok(NodeStatus {
                running: state.running,
                status: state.status.clone(),
            })
        })
    }
}

#[async_trait]
impl NetworkOps for MemoryRuntime {
    async fn create_network_if_not_present(
        &self,
        ctx: &OpContext,
        network: &ClusterNetwork,
    ) -> Result<(ClusterNetwork, bool), RuntimeError> {
        let name = network.name.as_str();
        self.engine(ctx, "create network", |st| {
            if let Some(existing) = st.networks.get(name) {
                let view = existing.view(name);
                if !network.is_compatible_with(&view) {
                    return Err(RuntimeError::already_exists(ResourceKind::Network, name));
                }
                return Ok((view, true));
            }

            let subnet = match &network.subnet {
                Some(s) => {
                    let subnet = parse_subnet(s).ok_or_else(|| {
                        RuntimeError::engine("create network", name, format!("invalid subnet {s}"))
                    })?;
                    if st.overlaps_existing(subnet) {
                        return Err(RuntimeError::engine(
                            "create network",
                            name,
                            format!("subnet {s} overlaps an existing network"),
                        ));
                    }
                    subnet
                }
                None => st.free_auto_subnet().ok_or_else(|| {
                    RuntimeError::engine("create network", name, "no free subnet in 10.89.0.0/16")
                })?,
            };
            let gateway = network
                .gateway
                .unwrap_or_else(|| IpAddr::V4(Ipv4Addr::from(u32::from(subnet.0) + 1)));

            let mut labels = network.labels.clone();
            labels.extend(scope_labels());
            let created = MemNetwork {
                id: NetworkId::new(st.next_id()),
                labels,
                subnet: Some(subnet),
                gateway: Some(gateway),
                members: BTreeMap::new(),
            };
            let view = created.view(name);
            st.networks.insert(name.to_string(), created);
            debug!(network = %name, runtime = "memory", "created network");
            Ok((view, false))
        })
    }

    async fn delete_network(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.engine(ctx, "delete network", |st| {
            let Some(net) = st.networks.get(name) else {
                return Ok(());
            };
            if !in_scope(&net.labels) {
                info!(network = %name, "leaving network not created by kubeling in place");
                return Ok(());
            }
            if !net.members.is_empty() {
                return Err(RuntimeError::engine(
                    "delete network",
                    name,
                    "network has active endpoints",
                ));
            }
            st.networks.remove(name);
            Ok(())
        })
    }

    async fn get_network(&self, ctx: &OpContext, name: &str) -> Result<ClusterNetwork, RuntimeError> {
        self.engine(ctx, "get network", |st| {
            st.networks
                .get(name)
                .map(|n| n.view(name))
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Network, name))
        })
    }

    async fn get_nodes_in_network(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Vec<Node>, RuntimeError> {
        self.engine(ctx, "list network nodes", |st| {
            let net = st
                .networks
                .get(name)
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Network, name))?;
            Ok(net.members.keys().filter_map(|n| st.node_view(n)).collect())
        })
    }

    async fn connect_node_to_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        self.engine(ctx, "connect node", |st| {
            st.node(node)?;
            st.join(node, network)?;
            let mem = st.node_mut(node)?;
            if !mem.node.networks.iter().any(|n| n == network) {
                mem.node.networks.push(network.to_string());
            }
            Ok(())
        })
    }

    async fn disconnect_node_from_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        self.engine(ctx, "disconnect node", |st| {
            if let Some(net) = st.networks.get_mut(network) {
                net.members.remove(node);
            }
            if let Some(mem) = st.nodes.get_mut(node) {
                mem.node.networks.retain(|n| n != network);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl VolumeOps for MemoryRuntime {
    async fn create_volume(
        &self,
        ctx: &OpContext,
        name: &str,
        labels: &Labels,
    ) -> Result<Volume, RuntimeError> {
        self.engine(ctx, "create volume", |st| {
            let volume = st.volumes.entry(name.to_string()).or_insert_with(|| {
                let mut labels = labels.clone();
                labels.extend(scope_labels());
                Volume {
                    name: name.to_string(),
                    labels,
                    mountpoint: Some(format!("/var/lib/kubeling/volumes/{name}/_data")),
                }
            });
            Ok(volume.clone())
        })
    }

    async fn delete_volume(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.engine(ctx, "delete volume", |st| {
            st.volumes.remove(name);
            Ok(())
        })
    }

    async fn get_volume(&self, ctx: &OpContext, name: &str) -> Result<Volume, RuntimeError> {
        self.engine(ctx, "get volume", |st| {
            st.volumes
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::Volume, name))
        })
    }

    async fn get_volumes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Volume>, RuntimeError> {
        self.engine(ctx, "list volumes", |st| {
            Ok(st
                .volumes
                .values()
                .filter(|v| labels_match(&v.labels, labels))
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl ExecOps for MemoryRuntime {
    async fn exec_in_node(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<(), RuntimeError> {
        let outcome = self.run_command(ctx, node, cmd, &[])?;
        check_outcome(node, cmd, outcome)
    }

    async fn exec_in_node_with_stdin(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        mut stdin: InputStream,
    ) -> Result<(), RuntimeError> {
        let input = ctx
            .run("exec", async {
                let mut buf = Vec::new();
                stdin
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| RuntimeError::engine("exec", node, e))?;
                Ok(buf)
            })
            .await?;

        let outcome = self.run_command(ctx, node, cmd, &input)?;
        check_outcome(node, cmd, outcome)
    }

    async fn exec_in_node_get_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<ExecLogs, RuntimeError> {
        let outcome = self.run_command(ctx, node, cmd, &[])?;
        let code = outcome.code;
        Ok(ExecLogs::new(
            node.to_string(),
            cmd.to_vec(),
            Box::pin(Cursor::new(outcome.output)),
            Box::pin(futures::future::ready(Ok(code))),
        ))
    }
}

#[async_trait]
impl LogOps for MemoryRuntime {
    async fn get_node_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        since: Option<DateTime<Utc>>,
        opts: &LogOptions,
    ) -> Result<ByteStream, RuntimeError> {
        let lines = self.engine(ctx, "logs", |st| Ok(st.node(node)?.logs.clone()))?;

        let mut lines: Vec<_> = lines
            .into_iter()
            .filter(|(at, _)| since.is_none_or(|s| *at >= s))
            .collect();
        if let Some(tail) = opts.tail {
            let keep = usize::try_from(tail).unwrap_or(usize::MAX);
            lines.drain(..lines.len().saturating_sub(keep));
        }

        let rendered: Vec<Result<Bytes, RuntimeError>> = lines
            .into_iter()
            .map(|(at, line)| {
                let text = if opts.timestamps {
                    format!("{} {line}\n", at.to_rfc3339_opts(SecondsFormat::Nanos, true))
                } else {
                    format!("{line}\n")
                };
                Ok(Bytes::from(text))
            })
            .collect();

        let past = futures::stream::iter(rendered);
        if opts.follow {
            // Nothing new is ever logged while streaming; stay open until cancelled.
            return Ok(Box::pin(ctx.bind_stream(past.chain(futures::stream::pending()))));
        }
        Ok(Box::pin(past))
    }
}

#[async_trait]
impl FileOps for MemoryRuntime {
    async fn copy_to_node(
        &self,
        ctx: &OpContext,
        source: &Path,
        destination: &str,
        node: &str,
    ) -> Result<(), RuntimeError> {
        let (content, mode) = ctx.run("copy", archive::read_local_file(source)).await?;
        self.write_to_node(ctx, &content, destination, mode, node).await
    }

    async fn write_to_node(
        &self,
        ctx: &OpContext,
        content: &[u8],
        destination: &str,
        mode: u32,
        node: &str,
    ) -> Result<(), RuntimeError> {
        archive::archive_path(destination)?;
        self.engine(ctx, "write", |st| {
            st.node_mut(node)?.files.insert(
                destination.to_string(),
                MemFile {
                    content: content.to_vec(),
                    mode: mode & 0o7777,
                },
            );
            Ok(())
        })
    }

    async fn read_from_node(
        &self,
        ctx: &OpContext,
        path: &str,
        node: &str,
    ) -> Result<ByteStream, RuntimeError> {
        let content = self.engine(ctx, "read", |st| {
            st.node(node)?
                .files
                .get(path)
                .map(|f| f.content.clone())
                .ok_or_else(|| RuntimeError::not_found(ResourceKind::File, path))
        })?;
        Ok(Box::pin(ctx.bind_stream(futures::stream::iter(chunked(content)))))
    }

    async fn get_kubeconfig(&self, ctx: &OpContext, node: &str) -> Result<ByteStream, RuntimeError> {
        self.read_from_node(ctx, KUBECONFIG_PATH, node).await
    }
}

/// Docker-archive layout reduced to its manifest.
fn export_archive(images: &[String]) -> std::io::Result<Vec<u8>> {
    let manifest: Vec<serde_json::Value> = images
        .iter()
        .map(|image| serde_json::json!({ "Config": "", "RepoTags": [image], "Layers": [] }))
        .collect();
    let manifest = serde_json::to_vec(&manifest)?;

    let mut ar = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    ar.append_data(&mut header, "manifest.json", manifest.as_slice())?;
    ar.into_inner()
}

#[async_trait]
impl ImageOps for MemoryRuntime {
    async fn get_images(&self, ctx: &OpContext) -> Result<Vec<String>, RuntimeError> {
        self.engine(ctx, "list images", |st| Ok(st.images.iter().cloned().collect()))
    }

    async fn pull_image(&self, ctx: &OpContext, image: &str) -> Result<(), RuntimeError> {
        if image.is_empty() {
            return Err(RuntimeError::engine("pull", image, "empty image reference"));
        }
        debug!(image = %image, runtime = "memory", "pulling image");
        self.engine(ctx, "pull image", |st| {
            st.images.insert(image.to_string());
            Ok(())
        })
    }

    async fn get_image_stream(
        &self,
        ctx: &OpContext,
        images: &[String],
    ) -> Result<ByteStream, RuntimeError> {
        if images.is_empty() {
            return Err(RuntimeError::engine("export", "", "no images requested"));
        }
        self.engine(ctx, "export images", |st| {
            match images.iter().find(|i| !st.images.contains(*i)) {
                Some(missing) => Err(RuntimeError::not_found(ResourceKind::Image, missing)),
                None => Ok(()),
            }
        })?;

        let archive = export_archive(images)
            .map_err(|e| RuntimeError::engine("export", images.join(","), e))?;
        Ok(Box::pin(ctx.bind_stream(futures::stream::iter(chunked(archive)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnets_are_normalized() {
        assert_eq!(parse_subnet("172.28.5.9/16"), Some((Ipv4Addr::new(172, 28, 0, 0), 16)));
        assert_eq!(parse_subnet("10.0.0.0/24"), Some((Ipv4Addr::new(10, 0, 0, 0), 24)));
        assert_eq!(parse_subnet("10.0.0.0/31"), None);
        assert_eq!(parse_subnet("fd00::/64"), None);
        assert_eq!(parse_subnet("garbage"), None);
    }

    fn network(subnet: &str, gateway: &str) -> MemNetwork {
        MemNetwork {
            id: NetworkId::new("n"),
            labels: scope_labels(),
            subnet: parse_subnet(subnet),
            gateway: Some(gateway.parse().unwrap()),
            members: BTreeMap::new(),
        }
    }

    #[test]
    fn addresses_follow_gateway() {
        let mut net = network("172.28.0.0/16", "172.28.0.1");
        let first = net.free_address("n").unwrap();
        assert_eq!(first, Some("172.28.0.2".parse().unwrap()));
        net.members.insert("a".into(), first);
        assert_eq!(net.free_address("n").unwrap(), Some("172.28.0.3".parse().unwrap()));
    }

    #[test]
    fn released_addresses_are_reused() {
        let mut net = network("10.0.0.0/24", "10.0.0.1");
        net.members.insert("a".into(), Some("10.0.0.2".parse().unwrap()));
        net.members.insert("b".into(), Some("10.0.0.3".parse().unwrap()));
        net.members.remove("a");
        assert_eq!(net.free_address("n").unwrap(), Some("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn top_of_address_space_is_exhausted_not_overflowed() {
        let mut net = network("255.255.255.252/30", "255.255.255.253");
        let only = net.free_address("n").unwrap();
        assert_eq!(only, Some("255.255.255.254".parse().unwrap()));
        net.members.insert("a".into(), only);
        let err = net.free_address("n").unwrap_err();
        assert!(err.to_string().contains("subnet exhausted"));
    }

    #[test]
    fn auto_subnets_skip_taken_ranges() {
        let mut st = State::default();
        st.networks.insert("pinned".into(), network("10.89.0.0/23", "10.89.0.1"));
        assert_eq!(st.free_auto_subnet(), Some((Ipv4Addr::new(10, 89, 2, 0), 24)));
        st.networks.insert("all".into(), network("10.89.0.0/16", "10.89.0.1"));
        assert_eq!(st.free_auto_subnet(), None);
    }

    #[test]
    fn overlap_uses_the_wider_prefix() {
        let wide = parse_subnet("10.0.0.0/8").unwrap();
        assert!(overlaps(wide, parse_subnet("10.3.0.0/24").unwrap()));
        assert!(!overlaps(wide, parse_subnet("11.0.0.0/24").unwrap()));
    }

    #[test]
    fn chunks_cover_content() {
        let data = vec![7u8; CHUNK * 2 + 5];
        let chunks = chunked(data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref().unwrap().len(), 5);
        assert!(chunked(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn cancelled_calls_never_reach_state() {
        let rt = MemoryRuntime::new();
        let ctx = OpContext::new();
        ctx.cancel();
        assert!(rt.get_images(&ctx).await.is_err());
        assert_eq!(rt.engine_calls(), 0);
    }

    #[tokio::test]
    async fn export_lists_requested_tags() {
        let rt = MemoryRuntime::new().with_image("alpine:3");
        let ctx = OpContext::new();
        let stream = rt.get_image_stream(&ctx, &["alpine:3".to_string()]).await.unwrap();
        let tarball = archive::collect(archive::first_file(stream, "manifest.json"))
            .await
            .unwrap();
        let manifest: serde_json::Value = serde_json::from_slice(&tarball).unwrap();
        assert_eq!(manifest[0]["RepoTags"][0], "alpine:3");
    }
}
