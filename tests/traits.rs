// ABOUTME: Tests for runtime trait definitions.
// ABOUTME: Verifies capability traits compose and the umbrella trait is object safe.

use kubeling::runtime::traits::*;
use kubeling::runtime::{MemoryRuntime, OpContext, RuntimeError};
use kubeling::types::{ContainerId, NodeName};
use std::sync::Arc;

/// Verify that function signatures work with narrow trait bounds.
mod trait_bounds {
    use super::*;

    /// Function requiring only ImageOps.
    async fn ensure_image(rt: &impl ImageOps, ctx: &OpContext, image: &str) -> Result<(), RuntimeError> {
        if !rt.get_images(ctx).await?.iter().any(|i| i == image) {
            rt.pull_image(ctx, image).await?;
        }
        Ok(())
    }

    /// Function requiring NodeOps and NetworkOps.
    async fn boot(
        rt: &(impl NodeOps + NetworkOps),
        ctx: &OpContext,
        node: &Node,
        network: &str,
    ) -> Result<ContainerId, RuntimeError> {
        rt.create_network_if_not_present(ctx, &ClusterNetwork::new(network))
            .await?;
        let id = rt.create_node(ctx, &node.clone().with_network(network)).await?;
        rt.start_node(ctx, node.name.as_str()).await?;
        Ok(id)
    }

    #[tokio::test]
    async fn narrow_bounds_accept_an_adapter() {
        let rt = MemoryRuntime::new();
        let ctx = OpContext::new();

        ensure_image(&rt, &ctx, "rancher/k3s:v1.31.0-k3s1").await.unwrap();
        let node = Node::new(NodeName::new("server-0").unwrap(), Role::Server, "rancher/k3s:v1.31.0-k3s1");
        let id = boot(&rt, &ctx, &node, "k3s").await.unwrap();

        let got = rt.get_node(&ctx, "server-0").await.unwrap();
        assert_eq!(got.id, Some(id));
        assert!(got.state.running);
    }
}

mod object_safety {
    use super::*;

    fn assert_send_sync<T: Send + Sync + ?Sized>() {}

    #[test]
    fn runtime_is_object_safe_and_shareable() {
        assert_send_sync::<dyn Runtime>();
        let rt: Arc<dyn Runtime> = Arc::new(MemoryRuntime::new());
        assert_eq!(rt.id(), "memory");
    }

    #[tokio::test]
    async fn trait_objects_dispatch() {
        let rt: Arc<dyn Runtime> = Arc::new(MemoryRuntime::new());
        let nodes = rt.get_nodes_by_label(&OpContext::new(), &Labels::new()).await.unwrap();
        assert!(nodes.is_empty());
    }
}

mod shared_types {
    use super::*;

    #[test]
    fn engine_labels_carry_scope_and_role() {
        let node = Node::new(NodeName::new("agent-1").unwrap(), Role::Agent, "img").with_label("cluster", "dev");
        let labels = node.engine_labels();
        assert!(in_scope(&labels));
        assert_eq!(role_from_labels(&labels), Some(Role::Agent));
        assert_eq!(labels.get("cluster").map(String::as_str), Some("dev"));
    }

    #[test]
    fn empty_label_filter_matches_everything() {
        assert!(labels_match(&scope_labels(), &Labels::new()));
        let wanted: Labels = [("app".to_string(), "other".to_string())].into_iter().collect();
        assert!(!labels_match(&scope_labels(), &wanted));
    }

    #[test]
    fn subnet_pinning_decides_compatibility() {
        let existing = ClusterNetwork::new("k3s").with_subnet("172.28.0.0/16");
        assert!(ClusterNetwork::new("k3s").is_compatible_with(&existing));
        assert!(ClusterNetwork::new("k3s").with_subnet("172.28.0.0/16").is_compatible_with(&existing));
        assert!(!ClusterNetwork::new("k3s").with_subnet("10.0.0.0/8").is_compatible_with(&existing));
        assert!(!existing.is_compatible_with(&ClusterNetwork::new("k3s")));
    }

    #[test]
    fn subnets_compare_by_network_address() {
        let existing = ClusterNetwork::new("k3s").with_subnet("172.28.0.0/16");
        assert!(ClusterNetwork::new("k3s").with_subnet("172.28.5.9/16").is_compatible_with(&existing));
        assert!(!ClusterNetwork::new("k3s").with_subnet("172.28.5.9/24").is_compatible_with(&existing));
        assert_eq!(
            canonical_cidr("fd00:1::5/64"),
            Some(("fd00:1::".parse().unwrap(), 64))
        );
        assert_eq!(canonical_cidr("10.0.0.0/33"), None);
        assert_eq!(canonical_cidr("garbage"), None);
    }

    #[test]
    fn log_option_shortcuts() {
        assert!(LogOptions::follow().follow);
        assert_eq!(LogOptions::tail(5).tail, Some(5));
        assert!(!LogOptions::default().timestamps);
    }
}
