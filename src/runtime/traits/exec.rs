// ABOUTME: Exec operations for runtime adapters.
// ABOUTME: Run commands inside nodes, optionally feeding stdin or streaming output.

use super::sealed::Sealed;
use super::shared_types::{ExecLogs, InputStream};
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;

/// Commands inside running nodes.
#[async_trait]
pub trait ExecOps: Sealed + Send + Sync {
    /// Run `cmd` to completion.
    ///
    /// A non-zero exit fails with `CommandFailed` carrying the exit code and
    /// the combined output.
    async fn exec_in_node(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<(), RuntimeError>;

    /// Like [`ExecOps::exec_in_node`], with `stdin` copied into the command
    /// once and then closed.
    async fn exec_in_node_with_stdin(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        stdin: InputStream,
    ) -> Result<(), RuntimeError>;

    /// Start `cmd` and hand back its output while it is still running.
    async fn exec_in_node_get_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<ExecLogs, RuntimeError>;
}
