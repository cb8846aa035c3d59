// ABOUTME: Image listing, pulling and export via the Docker Engine API.
// ABOUTME: Export streams a docker-archive tarball without buffering it.

use super::errors::status_of;
use super::{DockerRuntime, prime};
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{ByteStream, ImageOps};
use async_trait::async_trait;
use bollard::query_parameters::{CreateImageOptions, ListImagesOptions};
use futures::StreamExt;
use tracing::debug;

/// Untagged images are listed as `<none>:<none>`.
const UNTAGGED: &str = "<none>:<none>";

#[async_trait]
impl ImageOps for DockerRuntime {
    async fn get_images(&self, ctx: &OpContext) -> Result<Vec<String>, RuntimeError> {
        let summaries = ctx
            .run("list images", async {
                self.client
                    .list_images(Some(ListImagesOptions {
                        all: false,
                        ..Default::default()
                    }))
                    .await
                    .map_err(self.map_err("list", ResourceKind::Image, ""))
            })
            .await?;

        let mut images: Vec<String> = summaries
            .into_iter()
            .flat_map(|s| s.repo_tags)
            .filter(|tag| tag != UNTAGGED)
            .collect();
        images.sort();
        images.dedup();
        Ok(images)
    }

    async fn pull_image(&self, ctx: &OpContext, image: &str) -> Result<(), RuntimeError> {
        debug!(image = %image, runtime = "docker", "pulling image");
        ctx.run("pull image", async {
            let opts = CreateImageOptions {
                from_image: Some(image.to_string()),
                ..Default::default()
            };
            // Progress reports carry no information the caller needs.
            let mut progress = self.client.create_image(Some(opts), None, None);
            while let Some(report) = progress.next().await {
                report.map_err(self.map_err("pull", ResourceKind::Image, image))?;
            }
            Ok(())
        })
        .await
    }

    async fn get_image_stream(
        &self,
        ctx: &OpContext,
        images: &[String],
    ) -> Result<ByteStream, RuntimeError> {
        if images.is_empty() {
            return Err(RuntimeError::engine("export", "", "no images requested"));
        }
        debug!(images = ?images, "exporting images");

        let endpoint = self.socket.clone();
        let target = images.join(",");
        let refs: Vec<&str> = images.iter().map(String::as_str).collect();
        let archive: ByteStream = Box::pin(self.client.export_images(&refs).map(move |chunk| {
            chunk.map_err(|e| {
                if status_of(&e) == Some(404) {
                    RuntimeError::not_found(ResourceKind::Image, &target)
                } else {
                    super::errors::map_error(e, &endpoint, "export", ResourceKind::Image, &target)
                }
            })
        }));

        let archive = ctx.run("export images", prime(archive)).await?;
        Ok(Box::pin(ctx.bind_stream(archive)))
    }
}
