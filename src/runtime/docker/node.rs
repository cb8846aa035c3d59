// ABOUTME: Node lifecycle against the Docker Engine API.
// ABOUTME: Translates between Node and bollard container models.

use super::errors::{is_not_modified, map_create_error, message_of, status_of};
use super::{DockerRuntime, node_key};
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{
    APP_NAME, ImageOps, LABEL_APP, Labels, NetworkOps, Node, NodeOps, NodeState, NodeStatus,
    PortMapping, Protocol, in_scope, role_from_labels,
};
use crate::types::{ContainerId, NodeName};
use async_trait::async_trait;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, EndpointSettings, HostConfig,
    NetworkingConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds a node gets to shut down before it is killed.
const STOP_TIMEOUT_SECS: i32 = 10;

fn container_body(node: &Node) -> Result<ContainerCreateBody, RuntimeError> {
    let mut host_config = HostConfig {
        privileged: Some(true),
        init: Some(true),
        ..Default::default()
    };
    if node.restart {
        host_config.restart_policy = Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        });
    }
    if let Some(memory) = node.memory {
        let limit = i64::try_from(memory).map_err(|e| {
            RuntimeError::engine("create", node.name.as_str(), format!("memory limit {memory}: {e}"))
        })?;
        host_config.memory = Some(limit);
    }
    if !node.volumes.is_empty() {
        host_config.binds = Some(node.volumes.clone());
    }
    if !node.extra_hosts.is_empty() {
        host_config.extra_hosts = Some(node.extra_hosts.clone());
    }

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = Vec::new();
    for port in &node.ports {
        let key = format!("{}/{}", port.container_port, port.protocol.as_str());
        exposed_ports.push(key.clone());
        port_bindings.entry(key).or_default().get_or_insert_with(Vec::new).push(PortBinding {
            host_ip: port.host_ip.clone(),
            host_port: port.host_port.map(|p| p.to_string()),
        });
    }
    if !port_bindings.is_empty() {
        host_config.port_bindings = Some(port_bindings);
    }

    // Only the primary network can be set at creation; the rest are connected afterwards.
    let networking_config = node.networks.first().map(|network| {
        host_config.network_mode = Some(network.clone());
        let endpoint = EndpointSettings {
            aliases: Some(vec![node.name.to_string()]),
            ..Default::default()
        };
        NetworkingConfig {
            endpoints_config: Some(HashMap::from([(network.clone(), endpoint)])),
        }
    });

    let cmd: Vec<String> = node.cmd.iter().chain(&node.args).cloned().collect();

    Ok(ContainerCreateBody {
        image: Some(node.image.clone()),
        hostname: Some(node.name.to_string()),
        env: if node.env.is_empty() {
            None
        } else {
            Some(node.env.clone())
        },
        cmd: if cmd.is_empty() { None } else { Some(cmd) },
        labels: Some(node.engine_labels()),
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    })
}

fn parse_port_key(key: &str) -> Option<(u16, Protocol)> {
    let (port, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    let protocol = match proto {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    };
    Some((port.parse().ok()?, protocol))
}

/// The requested network an engine 404 on create refers to, if any.
fn missing_network<'a>(message: &str, networks: &'a [String]) -> Option<&'a str> {
    if !message.to_ascii_lowercase().contains("network") {
        return None;
    }
    networks
        .iter()
        .find(|n| message.contains(n.as_str()))
        .or_else(|| networks.first())
        .map(String::as_str)
}

/// Build a Node from an inspected container.
///
/// Returns `Ok(None)` for containers outside this tool's scope.
pub(super) fn node_from_inspect(
    details: ContainerInspectResponse,
) -> Result<Option<Node>, RuntimeError> {
    let raw_name = details
        .name
        .as_deref()
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    let config = details.config.unwrap_or_default();
    let labels: Labels = config.labels.unwrap_or_default();
    if !in_scope(&labels) {
        return Ok(None);
    }

    let name = NodeName::new(&raw_name).map_err(|e| RuntimeError::engine("inspect", &raw_name, e))?;
    let role = role_from_labels(&labels).ok_or_else(|| {
        RuntimeError::engine("inspect", &raw_name, "node carries no valid role label")
    })?;

    let mut node = Node::new(name, role, config.image.unwrap_or_default());
    node.env = config.env.unwrap_or_default();
    node.cmd = config.cmd.unwrap_or_default();

    let host = details.host_config.unwrap_or_default();
    let primary = host.network_mode.clone();
    node.volumes = host.binds.unwrap_or_default();
    node.extra_hosts = host.extra_hosts.unwrap_or_default();
    node.memory = host.memory.and_then(|m| u64::try_from(m).ok()).filter(|m| *m > 0);
    node.restart = matches!(
        host.restart_policy.and_then(|p| p.name),
        Some(RestartPolicyNameEnum::UNLESS_STOPPED | RestartPolicyNameEnum::ALWAYS)
    );
    for (key, bindings) in host.port_bindings.unwrap_or_default() {
        let Some((container_port, protocol)) = parse_port_key(&key) else {
            continue;
        };
        for binding in bindings.unwrap_or_default() {
            node.ports.push(PortMapping {
                host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                host_port: binding.host_port.and_then(|p| p.parse().ok()),
                container_port,
                protocol,
            });
        }
    }
    node.ports.sort_by_key(|p| p.container_port);

    let endpoints = details
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default();
    let mut networks: Vec<(String, EndpointSettings)> = endpoints.into_iter().collect();
    // The network the container was created on comes first, the rest by name.
    networks.sort_by(|a, b| {
        let a_primary = primary.as_deref() == Some(a.0.as_str());
        let b_primary = primary.as_deref() == Some(b.0.as_str());
        b_primary.cmp(&a_primary).then_with(|| a.0.cmp(&b.0))
    });
    node.ip = networks.iter().find_map(|(_, endpoint)| {
        endpoint
            .ip_address
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .and_then(|ip| ip.parse().ok())
    });
    node.networks = networks.into_iter().map(|(name, _)| name).collect();

    let state = details.state.unwrap_or_default();
    node.state = NodeState {
        running: state.running.unwrap_or(false),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        started: state.started_at.map(|s| s.to_string()).filter(|s| !s.is_empty()),
    };
    node.labels = labels;
    node.id = details.id.map(ContainerId::new);

    Ok(Some(node))
}

impl DockerRuntime {
    /// Inspect a container, treating anything outside this tool's scope as absent.
    pub(super) async fn inspect_managed(
        &self,
        ctx: &OpContext,
        op: &'static str,
        name: &str,
    ) -> Result<ContainerInspectResponse, RuntimeError> {
        let details = ctx
            .run(op, async {
                self.client
                    .inspect_container(name, None::<InspectContainerOptions>)
                    .await
                    .map_err(self.map_err(op, ResourceKind::Node, name))
            })
            .await?;

        let labels = details.config.as_ref().and_then(|c| c.labels.as_ref());
        if !labels.is_some_and(in_scope) {
            return Err(RuntimeError::not_found(ResourceKind::Node, name));
        }
        Ok(details)
    }

    /// List managed containers matching `filters`, stopped ones included.
    pub(super) async fn list_managed(
        &self,
        ctx: &OpContext,
        mut filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<Node>, RuntimeError> {
        filters
            .entry("label".to_string())
            .or_default()
            .push(format!("{LABEL_APP}={APP_NAME}"));
        let opts = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let summaries = ctx
            .run("list nodes", async {
                // Podman reports a transient "stopping" state that bollard cannot
                // deserialize; it settles quickly.
                let mut attempt = 0;
                loop {
                    match self.client.list_containers(Some(opts.clone())).await {
                        Ok(list) => return Ok(list),
                        Err(e) if attempt < 2 && e.to_string().contains("unknown variant `stopping`") => {
                            attempt += 1;
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                        Err(e) => return Err(self.map_err("list", ResourceKind::Node, "")(e)),
                    }
                }
            })
            .await?;

        let mut nodes = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            let details = match self.inspect_managed(ctx, "list nodes", &id).await {
                Ok(details) => details,
                // Removed between listing and inspection.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            match node_from_inspect(details) {
                Ok(Some(node)) => nodes.push(node),
                Ok(None) => {}
                Err(e) => warn!(container = %id, error = %e, "skipping malformed node"),
            }
        }
        nodes.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(nodes)
    }

    async fn create_container(
        &self,
        ctx: &OpContext,
        node: &Node,
    ) -> Result<ContainerId, RuntimeError> {
        let name = node.name.as_str();
        let body = container_body(node)?;
        let create = || async {
            let opts = CreateContainerOptions {
                name: Some(name.to_string()),
                ..Default::default()
            };
            self.client
                .create_container(Some(opts), body.clone())
                .await
        };

        let map = |e: bollard::errors::Error| {
            if status_of(&e) == Some(404) {
                // A missing network is not a missing node.
                return match missing_network(&message_of(&e), &node.networks) {
                    Some(network) => RuntimeError::not_found(ResourceKind::Network, network),
                    None => RuntimeError::engine("create", name, e),
                };
            }
            map_create_error(e, &self.socket, ResourceKind::Node, name)
        };

        let response = match ctx.run("create node", async { Ok(create().await) }).await? {
            Ok(response) => response,
            Err(e) if status_of(&e) == Some(404) && message_of(&e).contains("image") => {
                debug!(node = %name, image = %node.image, "image missing, pulling");
                self.pull_image(ctx, &node.image).await?;
                ctx.run("create node", async { create().await.map_err(map) })
                    .await?
            }
            Err(e) => return Err(map(e)),
        };

        Ok(ContainerId::new(response.id))
    }

    async fn remove_container(&self, name: &str) -> Result<(), bollard::errors::Error> {
        let opts = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.client.remove_container(name, Some(opts)).await
    }
}

#[async_trait]
impl NodeOps for DockerRuntime {
    async fn create_node(&self, ctx: &OpContext, node: &Node) -> Result<ContainerId, RuntimeError> {
        let name = node.name.as_str();
        let _guard = self.locks.lock(&node_key(name)).await;
        debug!(node = %name, runtime = "docker", image = %node.image, "creating node");

        let id = self.create_container(ctx, node).await?;

        for network in node.networks.iter().skip(1) {
            if let Err(e) = self.connect_node_to_network(ctx, name, network).await {
                warn!(node = %name, network = %network, error = %e, "rolling back node creation");
                if let Err(cleanup) = self.remove_container(id.as_str()).await {
                    warn!(node = %name, error = %cleanup, "failed to remove half-created node");
                }
                return Err(e);
            }
        }

        Ok(id)
    }

    async fn delete_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        let _guard = self.locks.lock(&node_key(name)).await;
        match self.inspect_managed(ctx, "delete node", name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        debug!(node = %name, runtime = "docker", "deleting node");
        ctx.run("delete node", async {
            match self.remove_container(name).await {
                Ok(()) => Ok(()),
                Err(e) if status_of(&e) == Some(404) => Ok(()),
                Err(e) => Err(self.map_err("delete", ResourceKind::Node, name)(e)),
            }
        })
        .await
    }

    async fn rename_node(
        &self,
        ctx: &OpContext,
        name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError> {
        let new_name = NodeName::new(new_name).map_err(|e| RuntimeError::engine("rename", new_name, e))?;
        self.inspect_managed(ctx, "rename node", name).await?;

        debug!(node = %name, new_name = %new_name, "renaming node");
        ctx.run("rename node", async {
            let opts = RenameContainerOptions {
                name: new_name.to_string(),
            };
            self.client.rename_container(name, opts).await.map_err(|e| {
                if status_of(&e) == Some(409) {
                    RuntimeError::already_exists(ResourceKind::Node, new_name.as_str())
                } else {
                    self.map_err("rename", ResourceKind::Node, name)(e)
                }
            })
        })
        .await
    }

    async fn start_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inspect_managed(ctx, "start node", name).await?;
        debug!(node = %name, runtime = "docker", "starting node");
        ctx.run("start node", async {
            match self
                .client
                .start_container(name, None::<StartContainerOptions>)
                .await
            {
                Ok(()) => Ok(()),
                Err(e) if is_not_modified(&e) => Ok(()),
                Err(e) => Err(self.map_err("start", ResourceKind::Node, name)(e)),
            }
        })
        .await
    }

    async fn stop_node(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        self.inspect_managed(ctx, "stop node", name).await?;
        debug!(node = %name, runtime = "docker", "stopping node");
        ctx.run("stop node", async {
            let opts = StopContainerOptions {
                t: Some(STOP_TIMEOUT_SECS),
                signal: None,
            };
            match self.client.stop_container(name, Some(opts)).await {
                Ok(()) => Ok(()),
                Err(e) if is_not_modified(&e) => Ok(()),
                Err(e) => Err(self.map_err("stop", ResourceKind::Node, name)(e)),
            }
        })
        .await
    }

    async fn get_node(&self, ctx: &OpContext, name: &str) -> Result<Node, RuntimeError> {
        let details = self.inspect_managed(ctx, "get node", name).await?;
        node_from_inspect(details)?.ok_or_else(|| RuntimeError::not_found(ResourceKind::Node, name))
    }

    async fn get_nodes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Node>, RuntimeError> {
        let wanted: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let filters = HashMap::from([("label".to_string(), wanted)]);
        self.list_managed(ctx, filters).await
    }

    async fn get_node_status(&self, ctx: &OpContext, name: &str) -> Result<NodeStatus, RuntimeError> {
        let details = self.inspect_managed(ctx, "get node status", name).await?;
        let state = details.state.unwrap_or_default();
        Ok(NodeStatus {
            running: state.running.unwrap_or(false),
            status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::{LABEL_ROLE, Role};
    use bollard::models::{ContainerConfig, NetworkSettings};

    fn node() -> Node {
        Node::new(NodeName::new("kubeling-server-0").unwrap(), Role::Server, "rancher/k3s:latest")
            .with_network("net1")
            .with_network("net2")
            .with_label("cluster", "c1")
    }

    #[test]
    fn body_carries_scope_and_role_labels() {
        let body = container_body(&node()).unwrap();
        let labels = body.labels.unwrap();
        assert_eq!(labels.get(LABEL_APP).map(String::as_str), Some(APP_NAME));
        assert_eq!(labels.get(LABEL_ROLE).map(String::as_str), Some("server"));
        assert_eq!(labels.get("cluster").map(String::as_str), Some("c1"));
    }

    #[test]
    fn body_attaches_only_primary_network() {
        let body = container_body(&node()).unwrap();
        let endpoints = body.networking_config.unwrap().endpoints_config.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints.contains_key("net1"));
    }

    #[test]
    fn body_publishes_ports() {
        let mut n = node();
        n.ports.push(PortMapping {
            host_ip: Some("0.0.0.0".into()),
            host_port: Some(6550),
            container_port: 6443,
            protocol: Protocol::Tcp,
        });
        let body = container_body(&n).unwrap();
        assert_eq!(body.exposed_ports.unwrap(), vec!["6443/tcp".to_string()]);
        let bindings = body.host_config.unwrap().port_bindings.unwrap();
        let binding = &bindings["6443/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_port.as_deref(), Some("6550"));
    }

    #[test]
    fn unmanaged_container_is_out_of_scope() {
        let details = ContainerInspectResponse {
            name: Some("/other".into()),
            config: Some(ContainerConfig::default()),
            ..Default::default()
        };
        assert!(node_from_inspect(details).unwrap().is_none());
    }

    #[test]
    fn managed_container_round_trips_role() {
        let labels = node().engine_labels();
        let details = ContainerInspectResponse {
            id: Some("abc".into()),
            name: Some("/kubeling-server-0".into()),
            config: Some(ContainerConfig {
                image: Some("rancher/k3s:latest".into()),
                labels: Some(labels),
                ..Default::default()
            }),
            ..Default::default()
        };
        let n = node_from_inspect(details).unwrap().unwrap();
        assert_eq!(n.name.as_str(), "kubeling-server-0");
        assert_eq!(n.role, Role::Server);
        assert_eq!(n.id.unwrap().as_str(), "abc");
    }

    #[test]
    fn bad_role_label_is_an_error() {
        let mut labels = node().engine_labels();
        labels.insert(LABEL_ROLE.into(), "captain".into());
        let details = ContainerInspectResponse {
            name: Some("/n".into()),
            config: Some(ContainerConfig {
                labels: Some(labels),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(node_from_inspect(details).is_err());
    }

    #[test]
    fn oversized_memory_limit_is_rejected() {
        let mut n = node();
        n.memory = Some(u64::MAX);
        let err = container_body(&n).unwrap_err();
        assert_eq!(err.kind(), crate::runtime::ErrorKind::Engine);
    }

    #[test]
    fn network_404_names_the_missing_network() {
        let networks = vec!["net1".to_string(), "net2".to_string()];
        assert_eq!(missing_network("network net2 not found", &networks), Some("net2"));
        assert_eq!(missing_network("No such network", &networks), Some("net1"));
        assert_eq!(missing_network("No such image: alpine:3.20", &networks), None);
    }

    #[test]
    fn primary_network_is_listed_first() {
        let endpoint = |ip: &str| EndpointSettings {
            ip_address: Some(ip.into()),
            ..Default::default()
        };
        let details = ContainerInspectResponse {
            name: Some("/kubeling-server-0".into()),
            config: Some(ContainerConfig {
                labels: Some(node().engine_labels()),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                network_mode: Some("zeta".into()),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([
                    ("alpha".to_string(), endpoint("10.1.0.2")),
                    ("zeta".to_string(), endpoint("10.2.0.2")),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let n = node_from_inspect(details).unwrap().unwrap();
        assert_eq!(n.networks, vec!["zeta".to_string(), "alpha".to_string()]);
        assert_eq!(n.ip, Some("10.2.0.2".parse().unwrap()));
    }

    #[test]
    fn port_keys_parse() {
        assert_eq!(parse_port_key("53/udp"), Some((53, Protocol::Udp)));
        assert_eq!(parse_port_key("80"), Some((80, Protocol::Tcp)));
        assert_eq!(parse_port_key("x/tcp"), None);
    }
}
