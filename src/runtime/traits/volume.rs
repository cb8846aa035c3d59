// ABOUTME: Volume lifecycle operations for runtime adapters.
// ABOUTME: Named volumes outlive the nodes that mount them.

use super::sealed::Sealed;
use super::shared_types::{Labels, Volume};
use crate::runtime::context::OpContext;
use crate::runtime::error::RuntimeError;
use async_trait::async_trait;

#[async_trait]
pub trait VolumeOps: Sealed + Send + Sync {
    /// Create a named volume. An existing volume with that name is kept as is.
    async fn create_volume(
        &self,
        ctx: &OpContext,
        name: &str,
        labels: &Labels,
    ) -> Result<Volume, RuntimeError>;

    /// Absent volumes are not an error.
    async fn delete_volume(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError>;

    async fn get_volume(&self, ctx: &OpContext, name: &str) -> Result<Volume, RuntimeError>;

    async fn get_volumes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Volume>, RuntimeError>;
}
