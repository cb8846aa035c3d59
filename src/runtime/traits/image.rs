// ABOUTME: Image operations for runtime adapters.
// ABOUTME: List local images, pull one, export several as an archive stream.

use super::sealed::Sealed;
use super::shared_types::ByteStream;
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;

#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// References (`repo:tag`) of every locally available image.
    async fn get_images(&self, ctx: &OpContext) -> Result<Vec<String>, RuntimeError>;

    /// Pull one image, waiting for the pull to finish.
    async fn pull_image(&self, ctx: &OpContext, image: &str) -> Result<(), RuntimeError>;

    /// Stream a tar archive of the given images, for loading elsewhere.
    async fn get_image_stream(
        &self,
        ctx: &OpContext,
        images: &[String],
    ) -> Result<ByteStream, RuntimeError>;
}
