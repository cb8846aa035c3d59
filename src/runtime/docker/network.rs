// ABOUTME: Network lifecycle against the Docker Engine API.
// ABOUTME: Check-then-create and delete are serialized per network name.

use super::errors::{map_create_error, message_of, status_of};
use super::{DockerRuntime, network_key};
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{
    ClusterNetwork, NetworkMember, NetworkOps, Node, in_scope, scope_labels,
};
use async_trait::async_trait;
use bollard::models::{
    EndpointSettings, Ipam, IpamConfig, NetworkConnectRequest, NetworkCreateRequest,
    NetworkDisconnectRequest, NetworkInspect,
};
use bollard::query_parameters::InspectNetworkOptions;
use std::collections::HashMap;
use tracing::{debug, info};

fn network_from_model(net: NetworkInspect) -> ClusterNetwork {
    let labels = net.labels.unwrap_or_default();
    let ipam = net
        .ipam
        .and_then(|i| i.config)
        .and_then(|c| c.into_iter().next())
        .unwrap_or_default();

    let mut members: Vec<NetworkMember> = net
        .containers
        .unwrap_or_default()
        .into_values()
        .filter_map(|c| {
            Some(NetworkMember {
                name: c.name?,
                ip: c
                    .ipv4_address
                    .as_deref()
                    .and_then(|cidr| cidr.split('/').next())
                    .and_then(|ip| ip.parse().ok()),
            })
        })
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));

    ClusterNetwork {
        name: net.name.unwrap_or_default(),
        id: net.id.map(crate::types::NetworkId::new),
        external: !in_scope(&labels),
        subnet: ipam.subnet.filter(|s| !s.is_empty()),
        gateway: ipam.gateway.as_deref().and_then(|g| g.parse().ok()),
        labels,
        members,
    }
}

fn create_request(network: &ClusterNetwork) -> NetworkCreateRequest {
    let mut labels = network.labels.clone();
    labels.extend(scope_labels());

    let ipam = network.subnet.as_ref().map(|subnet| Ipam {
        config: Some(vec![IpamConfig {
            subnet: Some(subnet.clone()),
            gateway: network.gateway.map(|g| g.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    });

    NetworkCreateRequest {
        name: network.name.clone(),
        driver: Some("bridge".to_string()),
        labels: Some(labels),
        ipam,
        ..Default::default()
    }
}

impl DockerRuntime {
    pub(super) async fn inspect_network(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<ClusterNetwork, RuntimeError> {
        let net = ctx
            .run("inspect network", async {
                self.client
                    .inspect_network(name, None::<InspectNetworkOptions>)
                    .await
                    .map_err(self.map_err("inspect", ResourceKind::Network, name))
            })
            .await?;
        Ok(network_from_model(net))
    }

    async fn endpoint_networks(
        &self,
        ctx: &OpContext,
        op: &'static str,
        node: &str,
    ) -> Result<HashMap<String, EndpointSettings>, RuntimeError> {
        let details = self.inspect_managed(ctx, op, node).await?;
        Ok(details
            .network_settings
            .and_then(|s| s.networks)
            .unwrap_or_default())
    }

    /// Existing network compatible with the request, as `(network, true)`.
    fn reuse(
        requested: &ClusterNetwork,
        existing: ClusterNetwork,
    ) -> Result<(ClusterNetwork, bool), RuntimeError> {
        if !requested.is_compatible_with(&existing) {
            return Err(RuntimeError::already_exists(ResourceKind::Network, &requested.name));
        }
        Ok((existing, true))
    }
}

#[async_trait]
impl NetworkOps for DockerRuntime {
    async fn create_network_if_not_present(
        &self,
        ctx: &OpContext,
        network: &ClusterNetwork,
    ) -> Result<(ClusterNetwork, bool), RuntimeError> {
        let name = network.name.as_str();
        let _guard = self.locks.lock(&network_key(name)).await;

        match self.inspect_network(ctx, name).await {
            Ok(existing) => return Self::reuse(network, existing),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        debug!(network = %name, runtime = "docker", subnet = ?network.subnet, "creating network");
        let created = ctx
            .run("create network", async {
                match self.client.create_network(create_request(network)).await {
                    Ok(_) => Ok(true),
                    // Created by someone else since the inspect above.
                    Err(e) if status_of(&e) == Some(409) => Ok(false),
                    Err(e) => Err(map_create_error(e, &self.socket, ResourceKind::Network, name)),
                }
            })
            .await?;

        let current = self.inspect_network(ctx, name).await?;
        if created {
            Ok((current, false))
        } else {
            Self::reuse(network, current)
        }
    }

    async fn delete_network(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        let _guard = self.locks.lock(&network_key(name)).await;

        let existing = match self.inspect_network(ctx, name).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if existing.external {
            info!(network = %name, "leaving network not created by kubeling in place");
            return Ok(());
        }

        debug!(network = %name, runtime = "docker", "deleting network");
        ctx.run("delete network", async {
            match self.client.remove_network(name).await {
                Ok(()) => Ok(()),
                Err(e) if status_of(&e) == Some(404) => Ok(()),
                Err(e) => Err(self.map_err("delete", ResourceKind::Network, name)(e)),
            }
        })
        .await
    }

    async fn get_network(&self, ctx: &OpContext, name: &str) -> Result<ClusterNetwork, RuntimeError> {
        self.inspect_network(ctx, name).await
    }

    async fn get_nodes_in_network(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Vec<Node>, RuntimeError> {
        self.inspect_network(ctx, name).await?;
        let filters = HashMap::from([("network".to_string(), vec![name.to_string()])]);
        self.list_managed(ctx, filters).await
    }

    async fn connect_node_to_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        if self
            .endpoint_networks(ctx, "connect node", node)
            .await?
            .contains_key(network)
        {
            return Ok(());
        }

        debug!(node = %node, network = %network, "connecting node to network");
        ctx.run("connect node", async {
            let request = NetworkConnectRequest {
                container: node.to_string(),
                endpoint_config: Some(EndpointSettings {
                    aliases: Some(vec![node.to_string()]),
                    ..Default::default()
                }),
            };
            match self.client.connect_network(network, request).await {
                Ok(()) => Ok(()),
                Err(e) if message_of(&e).contains("already exists") => Ok(()),
                Err(e) => Err(self.map_err("connect", ResourceKind::Network, network)(e)),
            }
        })
        .await
    }

    async fn disconnect_node_from_network(
        &self,
        ctx: &OpContext,
        node: &str,
        network: &str,
    ) -> Result<(), RuntimeError> {
        let endpoints = match self.endpoint_networks(ctx, "disconnect node", node).await {
            Ok(endpoints) => endpoints,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if !endpoints.contains_key(network) {
            return Ok(());
        }

        debug!(node = %node, network = %network, "disconnecting node from network");
        ctx.run("disconnect node", async {
            let request = NetworkDisconnectRequest {
                container: node.to_string(),
                force: Some(false),
            };
            match self.client.disconnect_network(network, request).await {
                Ok(()) => Ok(()),
                Err(e) if status_of(&e) == Some(404) => Ok(()),
                Err(e) if message_of(&e).contains("is not connected") => Ok(()),
                Err(e) => Err(self.map_err("disconnect", ResourceKind::Network, network)(e)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::{APP_NAME, LABEL_APP};
    use bollard::models::EndpointResource;

    #[test]
    fn request_pins_subnet_and_scope() {
        let req = create_request(&ClusterNetwork::new("net1").with_subnet("172.28.0.0/16"));
        assert_eq!(req.labels.unwrap().get(LABEL_APP).map(String::as_str), Some(APP_NAME));
        let config = req.ipam.unwrap().config.unwrap();
        assert_eq!(config[0].subnet.as_deref(), Some("172.28.0.0/16"));
    }

    #[test]
    fn request_without_subnet_leaves_ipam_to_engine() {
        assert!(create_request(&ClusterNetwork::new("net1")).ipam.is_none());
    }

    #[test]
    fn model_conversion_reads_gateway_and_members() {
        let net = NetworkInspect {
            name: Some("net1".into()),
            id: Some("deadbeef".into()),
            labels: Some(scope_labels()),
            ipam: Some(Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some("172.28.0.0/16".into()),
                    gateway: Some("172.28.0.1".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            containers: Some(HashMap::from([(
                "abc".to_string(),
                EndpointResource {
                    name: Some("n1".into()),
                    ipv4_address: Some("172.28.0.2/16".into()),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };

        let cn = network_from_model(net);
        assert!(!cn.external);
        assert_eq!(cn.gateway, Some("172.28.0.1".parse().unwrap()));
        assert_eq!(cn.members.len(), 1);
        assert_eq!(cn.members[0].ip, Some("172.28.0.2".parse().unwrap()));
    }

    #[test]
    fn unlabelled_network_is_external() {
        let cn = network_from_model(NetworkInspect {
            name: Some("bridge".into()),
            ..Default::default()
        });
        assert!(cn.external);
    }
}
