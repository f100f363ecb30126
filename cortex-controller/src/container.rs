//! Docker container driving via `bollard` (grounded on the pack's
//! `jeffa5-exp` docker-runner example — the teacher itself never talks to
//! Docker, so this module is the "enrich from the rest of the pack" case
//! documented in DESIGN.md).

use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;

pub struct ContainerDriver {
    docker: Docker,
}

pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub port_bindings: HashMap<String, Vec<bollard::models::PortBinding>>,
    pub exposed_ports: HashMap<String, HashMap<(), ()>>,
    pub binds: Vec<String>,
    pub gpu_device_requests: bool,
}

impl ContainerDriver {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().context("connecting to the Docker daemon")?;
        Ok(Self { docker })
    }

    pub async fn create_and_start(&self, spec: &ContainerSpec) -> Result<()> {
        let device_requests = if spec.gpu_device_requests {
            Some(vec![bollard::models::DeviceRequest {
                driver: Some("nvidia".to_string()),
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }])
        } else {
            None
        };

        let host_config = bollard::models::HostConfig {
            port_bindings: Some(spec.port_bindings.clone()),
            binds: Some(spec.binds.clone()),
            device_requests,
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(spec.exposed_ports.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .context("creating container")?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .context("starting container")?;
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.docker
            .stop_container(name, Some(StopContainerOptions { t: 10 }))
            .await
            .context("stopping container")?;
        Ok(())
    }

    /// `delete` only ever removes the container + DB row, never the model
    /// directory (spec.md §4.2's delete-safety invariant).
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .context("removing container")?;
        Ok(())
    }

    /// `true` once the container has exited (used by the quick-death poll).
    pub async fn has_exited(&self, name: &str) -> Result<bool> {
        let inspected = self.docker.inspect_container(name, None).await.context("inspecting container")?;
        let status = inspected.state.and_then(|s| s.status);
        Ok(matches!(
            status,
            Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD)
        ))
    }

    pub async fn tail_logs(&self, name: &str, tail_lines: &str) -> Result<String> {
        let mut stream = self.docker.logs(
            name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: tail_lines.to_string(),
                ..Default::default()
            }),
        );

        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("reading container logs")?;
            out.push_str(&chunk.to_string());
        }
        Ok(out)
    }
}
