// ABOUTME: Log streaming operations for runtime adapters.
// ABOUTME: Stream a node's combined output since a point in time.

use super::sealed::Sealed;
use super::shared_types::{ByteStream, LogOptions};
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait LogOps: Sealed + Send + Sync {
    /// Stream a node's log output.
    ///
    /// `since` limits output to entries at or after that instant. The stream
    /// ends when the context is cancelled.
    async fn get_node_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        since: Option<DateTime<Utc>>,
        opts: &LogOptions,
    ) -> Result<ByteStream, RuntimeError>;
}
