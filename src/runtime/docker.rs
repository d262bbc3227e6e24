//! Docker-backed implementation of [`ContainerRuntime`].
//!
//! Thin adapter over the bollard client. Build progress lines are forwarded
//! to tracing at trace level; a build error reported in the stream becomes a
//! [`HarnessError::Build`] rather than a transport error.

use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use futures_util::StreamExt;
use tracing::{debug, trace};

use super::{
    ContainerId, ContainerLogs, ContainerRuntime, ContainerSpec, ImageRef, tar_directory,
    tar_single_file, untar_single_file,
};
use crate::errors::{HarnessError, HarnessResult};

/// Container runtime client backed by a local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform's default socket/pipe.
    pub fn connect() -> HarnessResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build_image(&self, context: &Path, tag: &str) -> HarnessResult<ImageRef> {
        debug!(context = %context.display(), tag, "building fixture image");
        let archive = tar_directory(context)?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut image_id = None;
        let mut stream = self.docker.build_image(options, None, Some(archive));
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(HarnessError::Build(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    trace!(target: "vault_harness::build", "{line}");
                }
            }
            if let Some(aux) = info.aux
                && let Some(id) = aux.id
            {
                image_id = Some(id);
            }
        }

        // Older daemons omit the aux record; the tag we applied is still a
        // valid reference.
        let id = image_id.unwrap_or_else(|| tag.to_string());
        debug!(image = %id, "fixture image built");
        Ok(ImageRef(id))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerId> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Config::<String> {
            image: Some(spec.image.0.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.clone()),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "create warning: {warning}");
        }
        debug!(container = %response.id, name = %spec.name, "container created");
        Ok(ContainerId(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> HarnessResult<()> {
        self.docker
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await?;
        debug!(container = %id, "container started");
        Ok(())
    }

    async fn write_file(&self, id: &ContainerId, path: &str, content: &[u8]) -> HarnessResult<()> {
        let archive = tar_single_file(path, content)?;
        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(&id.0, Some(options), archive)
            .await?;
        Ok(())
    }

    async fn read_file(&self, id: &ContainerId, path: &str) -> HarnessResult<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut archive = Vec::new();
        let mut stream = self.docker.download_from_container(&id.0, Some(options));
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk?);
        }
        untar_single_file(&archive, path)
    }

    async fn wait_exit(&self, id: &ContainerId) -> HarnessResult<i64> {
        let mut stream = self
            .docker
            .wait_container(&id.0, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard surfaces non-zero exits through this error variant.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err.into()),
            None => Err(HarnessError::Runtime(format!(
                "wait stream for container {id} ended without a status"
            ))),
        }
    }

    async fn container_ip(&self, id: &ContainerId) -> HarnessResult<Option<String>> {
        let inspect = self
            .docker
            .inspect_container(&id.0, None::<InspectContainerOptions>)
            .await?;
        Ok(inspect
            .network_settings
            .and_then(|settings| settings.ip_address)
            .filter(|ip| !ip.is_empty()))
    }

    async fn logs(&self, id: &ContainerId) -> HarnessResult<ContainerLogs> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut logs = ContainerLogs::default();
        let mut stream = self.docker.logs(&id.0, Some(options));
        while let Some(item) = stream.next().await {
            match item? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    logs.stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    logs.stderr.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(logs)
    }

    async fn kill_container(&self, id: &ContainerId) -> HarnessResult<()> {
        self.docker
            .kill_container(&id.0, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> HarnessResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(&id.0, Some(options)).await?;
        debug!(container = %id, "container removed");
        Ok(())
    }
}
