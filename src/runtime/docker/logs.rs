// ABOUTME: Node log streaming against the Docker Engine API.
// ABOUTME: Multiplexed stdout/stderr frames are flattened into one byte stream.

use super::DockerRuntime;
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{ByteStream, LogOps, LogOptions};
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::query_parameters::LogsOptions;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::debug;

/// Payload of one multiplexed frame, whichever stream it came from.
pub(super) fn frame_bytes(output: LogOutput) -> Bytes {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    }
}

/// The engine takes `since` as 32-bit unix seconds.
fn logs_options(
    node: &str,
    since: Option<DateTime<Utc>>,
    opts: &LogOptions,
) -> Result<LogsOptions, RuntimeError> {
    let since = match since {
        Some(t) => i32::try_from(t.timestamp())
            .map_err(|e| RuntimeError::engine("logs", node, format!("since {t}: {e}")))?,
        None => 0,
    };
    Ok(LogsOptions {
        stdout: true,
        stderr: true,
        follow: opts.follow,
        timestamps: opts.timestamps,
        since,
        tail: opts
            .tail
            .map(|n| n.to_string())
            .unwrap_or_else(|| "all".to_string()),
        ..Default::default()
    })
}

#[async_trait]
impl LogOps for DockerRuntime {
    async fn get_node_logs(
        &self,
        ctx: &OpContext,
        node: &str,
        since: Option<DateTime<Utc>>,
        opts: &LogOptions,
    ) -> Result<ByteStream, RuntimeError> {
        let options = logs_options(node, since, opts)?;
        self.inspect_managed(ctx, "get node logs", node).await?;
        debug!(node = %node, follow = opts.follow, "streaming node logs");

        let endpoint = self.socket.clone();
        let target = node.to_string();
        let stream = self
            .client
            .logs(node, Some(options))
            .map(move |item| {
                item.map(frame_bytes).map_err(|e| {
                    super::errors::map_error(e, &endpoint, "logs", ResourceKind::Node, &target)
                })
            });

        Ok(Box::pin(ctx.bind_stream(stream)))
    }
}
