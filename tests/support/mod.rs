// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and node/network builders shared by integration tests.

use kubeling::runtime::traits::{Node, Role};
use kubeling::types::NodeName;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("kubeling=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Image used for nodes in integration tests; small and has a shell.
#[allow(dead_code)]
pub const TEST_IMAGE: &str = "alpine:3.20";

/// A server node that idles until stopped.
#[allow(dead_code)]
pub fn idle_node(name: &str) -> Node {
    Node::new(NodeName::new(name).unwrap(), Role::Server, TEST_IMAGE)
        .with_cmd(["sleep", "3600"])
}

/// Unique per-run suffix so parallel test binaries do not collide.
#[allow(dead_code)]
pub fn unique(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "{prefix}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
