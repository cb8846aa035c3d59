// ABOUTME: Command execution inside nodes via the Docker exec API.
// ABOUTME: Attached exec sessions with optional stdin and streamed combined output.

use super::DockerRuntime;
use super::errors::{map_error, map_exec_error};
use super::logs::frame_bytes;
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{BoxBufReader, ExecLogs, ExecOps, InputStream};
use crate::types::ExecId;
use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{StartExecOptions, StartExecResults};
use futures::StreamExt;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::debug;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait until the engine reports the exec as finished and return its exit code.
async fn wait_exit(
    client: Docker,
    endpoint: String,
    node: String,
    exec_id: ExecId,
) -> Result<i64, RuntimeError> {
    loop {
        let details = client
            .inspect_exec(exec_id.as_str())
            .await
            .map_err(|e| map_error(e, &endpoint, "exec", ResourceKind::Node, &node))?;
        if !details.running.unwrap_or(false) {
            return Ok(details.exit_code.unwrap_or(0));
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

fn detached(node: &str) -> RuntimeError {
    RuntimeError::engine("exec", node, "engine started exec detached")
}

impl DockerRuntime {
    async fn start_exec(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        attach_stdin: bool,
    ) -> Result<(ExecId, StartExecResults), RuntimeError> {
        if cmd.is_empty() {
            return Err(RuntimeError::engine("exec", node, "empty command"));
        }
        self.inspect_managed(ctx, "exec", node).await?;
        debug!(node = %node, cmd = ?cmd, runtime = "docker", "exec in node");

        ctx.run("exec", async {
            let config = bollard::models::ExecConfig {
                cmd: Some(cmd.to_vec()),
                attach_stdin: Some(attach_stdin),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                tty: Some(false),
                ..Default::default()
            };
            let created = self
                .client
                .create_exec(node, config)
                .await
                .map_err(|e| map_exec_error(e, &self.socket, node))?;

            let opts = StartExecOptions {
                detach: false,
                ..Default::default()
            };
            let started = self
                .client
                .start_exec(&created.id, Some(opts))
                .await
                .map_err(|e| map_exec_error(e, &self.socket, node))?;

            Ok((ExecId::new(created.id), started))
        })
        .await
    }

    fn exit_future(
        &self,
        ctx: &OpContext,
        node: &str,
        exec_id: ExecId,
    ) -> impl Future<Output = Result<i64, RuntimeError>> + Send + 'static {
        let ctx = ctx.clone();
        let wait = wait_exit(self.client.clone(), self.socket.clone(), node.to_string(), exec_id);
        async move { ctx.run("exec", wait).await }
    }
}

#[async_trait]
impl ExecOps for DockerRuntime {
    async fn exec_in_node(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<(), RuntimeError> {
        let logs = self.exec_in_node_get_logs(ctx, node, cmd).await?;
        ctx.run("exec", logs.wait()).await
    }

    async fn exec_in_node_with_stdin(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
        mut stdin: InputStream,
    ) -> Result<(), RuntimeError> {
        let (exec_id, started) = self.start_exec(ctx, node, cmd, true).await?;
        let StartExecResults::Attached {
            mut output,
            mut input,
        } = started
        else {
            return Err(detached(node));
        };

        // Output is drained while stdin is fed so neither side can stall the other.
        let feed = async move {
            match tokio::io::copy(&mut stdin, &mut input).await {
                Ok(_) => input.shutdown().await,
                // The command exited without reading all of its input.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(e),
            }
        };
        let drain = async {
            let mut collected = Vec::new();
            while let Some(item) = output.next().await {
                let frame = item.map_err(|e| map_exec_error(e, &self.socket, node))?;
                collected.extend_from_slice(&frame_bytes(frame));
            }
            Ok::<_, RuntimeError>(collected)
        };

        let (fed, collected) = ctx
            .run("exec", async { Ok(tokio::join!(feed, drain)) })
            .await?;
        let collected = collected?;
        fed.map_err(|e| RuntimeError::engine("exec", node, e))?;

        let exit_code = self.exit_future(ctx, node, exec_id).await?;
        if exit_code != 0 {
            return Err(RuntimeError::CommandFailed {
                node: node.to_string(),
                cmd: cmd.to_vec(),
                exit_code,
                output: String::from_utf8_lossy(&collected).into_owned(),
            });
        }
        Ok(())
    }

    async fn exec_in_node_get_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        cmd: &[String],
    ) -> Result<ExecLogs, RuntimeError> {
        let (exec_id, started) = self.start_exec(ctx, node, cmd, false).await?;
        let StartExecResults::Attached { output, .. } = started else {
            return Err(detached(node));
        };

        let frames = output.map(|item| item.map(frame_bytes).map_err(io::Error::other));
        let reader: BoxBufReader = Box::pin(StreamReader::new(ctx.bind_stream(frames)));
        let exit = Box::pin(self.exit_future(ctx, node, exec_id));

        Ok(ExecLogs::new(node.to_string(), cmd.to_vec(), reader, exit))
    }
}
