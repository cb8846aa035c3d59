// ABOUTME: Volume lifecycle against the Docker Engine API.
// ABOUTME: Creation is idempotent on the engine side; deletion treats absence as done.

use super::DockerRuntime;
use super::errors::status_of;
use crate::runtime::context::OpContext;
use crate::runtime::error::{ResourceKind, RuntimeError};
use crate::runtime::traits::{APP_NAME, LABEL_APP, Labels, Volume, VolumeOps, scope_labels};
use async_trait::async_trait;
use bollard::models::VolumeCreateRequest;
use bollard::query_parameters::{ListVolumesOptions, RemoveVolumeOptions};
use std::collections::HashMap;
use tracing::debug;

fn volume_from_model(volume: bollard::models::Volume) -> Volume {
    Volume {
        name: volume.name,
        labels: volume.labels,
        mountpoint: Some(volume.mountpoint).filter(|m| !m.is_empty()),
    }
}

#[async_trait]
impl VolumeOps for DockerRuntime {
    async fn create_volume(
        &self,
        ctx: &OpContext,
        name: &str,
        labels: &Labels,
    ) -> Result<Volume, RuntimeError> {
        let mut labels = labels.clone();
        labels.extend(scope_labels());

        debug!(volume = %name, runtime = "docker", "creating volume");
        let volume = ctx
            .run("create volume", async {
                let opts = VolumeCreateRequest {
                    name: Some(name.to_string()),
                    labels: Some(labels),
                    ..Default::default()
                };
                self.client
                    .create_volume(opts)
                    .await
                    .map_err(self.map_err("create", ResourceKind::Volume, name))
            })
            .await?;
        Ok(volume_from_model(volume))
    }

    async fn delete_volume(&self, ctx: &OpContext, name: &str) -> Result<(), RuntimeError> {
        debug!(volume = %name, runtime = "docker", "deleting volume");
        ctx.run("delete volume", async {
            match self
                .client
                .remove_volume(name, None::<RemoveVolumeOptions>)
                .await
            {
                Ok(()) => Ok(()),
                Err(e) if status_of(&e) == Some(404) => Ok(()),
                Err(e) => Err(self.map_err("delete", ResourceKind::Volume, name)(e)),
            }
        })
        .await
    }

    async fn get_volume(&self, ctx: &OpContext, name: &str) -> Result<Volume, RuntimeError> {
        let volume = ctx
            .run("get volume", async {
                self.client
                    .inspect_volume(name)
                    .await
                    .map_err(self.map_err("inspect", ResourceKind::Volume, name))
            })
            .await?;
        Ok(volume_from_model(volume))
    }

    async fn get_volumes_by_label(
        &self,
        ctx: &OpContext,
        labels: &Labels,
    ) -> Result<Vec<Volume>, RuntimeError> {
        let mut wanted: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        wanted.push(format!("{LABEL_APP}={APP_NAME}"));
        let opts = ListVolumesOptions {
            filters: Some(HashMap::from([("label".to_string(), wanted)])),
            ..Default::default()
        };

        let response = ctx
            .run("list volumes", async {
                self.client
                    .list_volumes(Some(opts))
                    .await
                    .map_err(self.map_err("list", ResourceKind::Volume, ""))
            })
            .await?;

        let mut volumes: Vec<Volume> = response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(volume_from_model)
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }
}
