// ABOUTME: File transfer into and out of nodes via the Docker archive API.
// ABOUTME: Uploads single-file tarballs; downloads are untarred on the fly.

use super::errors::status_of;
use super::{DockerRuntime, prime};
use crate::runtime::archive;
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{ByteStream, FileOps, KUBECONFIG_PATH};
use async_trait::async_trait;
use bollard::query_parameters::{DownloadFromContainerOptions, UploadToContainerOptions};
use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use tracing::debug;

#[async_trait]
impl FileOps for DockerRuntime {
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
        let path = archive::archive_path(destination)?;
        self.inspect_managed(ctx, "write", node).await?;

        let tarball = archive::pack_file(path, content, mode)
            .map_err(|e| RuntimeError::engine("write", destination, e))?;
        debug!(node = %node, destination = %destination, bytes = content.len(), "writing file to node");

        ctx.run("write", async {
            let opts = UploadToContainerOptions {
                path: "/".to_string(),
                ..Default::default()
            };
            self.client
                .upload_to_container(node, Some(opts), bollard::body_full(Bytes::from(tarball)))
                .await
                .map_err(self.map_err("write", ResourceKind::Node, node))
        })
        .await
    }

    async fn read_from_node(
        &self,
        ctx: &OpContext,
        path: &str,
        node: &str,
    ) -> Result<ByteStream, RuntimeError> {
        self.inspect_managed(ctx, "read", node).await?;
        debug!(node = %node, path = %path, "reading file from node");

        let endpoint = self.socket.clone();
        let file = path.to_string();
        let opts = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let tarball: ByteStream = Box::pin(
            self.client
                .download_from_container(node, Some(opts))
                .map(move |chunk| {
                    chunk.map_err(|e| {
                        if status_of(&e) == Some(404) {
                            RuntimeError::not_found(ResourceKind::File, &file)
                        } else {
                            super::errors::map_error(e, &endpoint, "read", ResourceKind::File, &file)
                        }
                    })
                }),
        );

        let tarball = ctx.run("read", prime(tarball)).await?;
        Ok(Box::pin(ctx.bind_stream(archive::first_file(tarball, path))))
    }

    async fn get_kubeconfig(&self, ctx: &OpContext, node: &str) -> Result<ByteStream, RuntimeError> {
        self.read_from_node(ctx, KUBECONFIG_PATH, node).await
    }
}
