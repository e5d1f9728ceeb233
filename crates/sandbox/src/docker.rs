//! Docker implementation of [`ContainerRuntime`] using the `bollard` crate.

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::Duration;

use shieldbox_core::{Error, Result};

use crate::runtime::{CommitRequest, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput};

/// Bound on the connectivity check performed by [`DockerRuntime::connect`].
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    /// Connect with the local defaults and verify the daemon answers a ping.
    pub async fn connect() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::DockerUnavailable(format!("Failed to connect to Docker daemon: {}", e))
        })?;
        let runtime = Self { docker };

        match tokio::time::timeout(PING_TIMEOUT, runtime.ping()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::DockerUnavailable(format!(
                    "Docker daemon did not answer within {:?}. Is Docker running?",
                    PING_TIMEOUT
                )))
            }
        }

        tracing::debug!("Connected to Docker daemon");
        Ok(runtime)
    }

    /// Wrap an existing bollard client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn not_found(err: &BollardError) -> bool {
    status_code(err) == Some(404)
}

fn host_config(spec: &ContainerSpec) -> bollard::models::HostConfig {
    use bollard::models::{HostConfig, Mount, MountTypeEnum};

    let hardening = &spec.hardening;
    let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

    HostConfig {
        mounts: Some(
            spec.mounts
                .iter()
                .map(|m| Mount {
                    typ: Some(MountTypeEnum::BIND),
                    source: Some(m.source.display().to_string()),
                    target: Some(m.target.clone()),
                    read_only: Some(m.read_only),
                    ..Default::default()
                })
                .collect(),
        ),
        auto_remove: Some(false),
        security_opt: non_empty(&hardening.security_opt),
        cap_drop: non_empty(&hardening.cap_drop),
        cap_add: non_empty(&hardening.cap_add),
        network_mode: hardening.network_mode.clone(),
        memory: hardening.memory_bytes,
        nano_cpus: hardening.nano_cpus,
        runtime: hardening.runtime.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            Error::DockerUnavailable(format!("Docker is not running or not accessible: {}", e))
        })?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if not_found(&e) => Ok(false),
            Err(e) => Err(Error::container(format!("inspect image {}", image), e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        use bollard::image::CreateImageOptions;

        let (from_image, tag) = match image.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (image, "latest"),
        };

        tracing::info!(image = %image, "Pulling sandbox image");
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| Error::container(format!("pull image {}", image), e))?;
        Ok(())
    }

    async fn create_container(&self, name: Option<&str>, spec: &ContainerSpec) -> Result<String> {
        use bollard::container::{Config, CreateContainerOptions};

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            env: Some(spec.env.clone()),
            cmd: spec.cmd.clone(),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            host_config: Some(host_config(spec)),
            ..Default::default()
        };

        let options = name.map(|name| CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| Error::container("create container", e))?;

        for warning in &response.warnings {
            tracing::warn!(container = %response.id, warning = %warning, "Docker warning on create");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| Error::container(format!("start container {}", id), e))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        use bollard::container::StopContainerOptions;

        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // Already stopped.
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) => Err(Error::container(format!("stop container {}", id), e)),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::container(format!("remove container {}", id), e))
    }

    async fn exec(&self, id: &str, cmd: &[String], working_dir: &str) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(working_dir.to_string()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, exec_options)
            .await
            .map_err(|e| Error::container(format!("create exec in {}", id), e))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::container(format!("start exec in {}", id), e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::Console { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::container(format!("read exec output from {}", id), e)),
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::container(format!("inspect exec in {}", id), e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn list_containers(&self, label: (&str, &str)) -> Result<Vec<ContainerSummary>> {
        use bollard::container::ListContainersOptions;

        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{}={}", label.0, label.1)],
        )]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::container("list containers", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    labels: c.labels.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    created: c.created.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn commit_container(&self, id: &str, request: &CommitRequest) -> Result<String> {
        use bollard::container::Config;
        use bollard::image::CommitContainerOptions;

        let options = CommitContainerOptions {
            container: id.to_string(),
            repo: request.repo.clone(),
            tag: request.tag.clone(),
            comment: request.comment.clone(),
            author: "shieldbox".to_string(),
            pause: request.pause,
            changes: None,
        };

        self.docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| Error::container(format!("commit container {}", id), e))?;

        let reference = request.reference();
        let image = self
            .docker
            .inspect_image(&reference)
            .await
            .map_err(|e| Error::container(format!("inspect image {}", reference), e))?;
        Ok(image.id.unwrap_or(reference))
    }
}
