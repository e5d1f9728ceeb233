//! In-memory container runtime for tests.
//!
//! Tracks containers, images and every call made, and can be told to fail
//! a given operation to exercise compensating paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use shieldbox_core::{Error, Result};

use crate::runtime::{CommitRequest, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput};

/// A container held by [`MockRuntime`].
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: Option<String>,
    pub spec: ContainerSpec,
    /// `created`, `running`, `paused` or `exited`.
    pub state: String,
    pub created: i64,
}

#[derive(Default)]
struct MockState {
    containers: Vec<MockContainer>,
    images: HashSet<String>,
    calls: Vec<String>,
    failures: HashMap<String, String>,
    exec_responses: VecDeque<ExecOutput>,
    exec_log: Vec<(String, Vec<String>)>,
}

impl MockState {
    fn record(&mut self, op: &str, target: &str) -> Result<()> {
        self.calls.push(if target.is_empty() {
            op.to_string()
        } else {
            format!("{}:{}", op, target)
        });
        match self.failures.get(op) {
            Some(message) => Err(Error::container(op, message)),
            None => Ok(()),
        }
    }

    fn container_mut(&mut self, op: &str, id: &str) -> Result<&mut MockContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::container(format!("{} {}", op, id), "No such container"))
    }
}

/// In-memory [`ContainerRuntime`].
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime with `image` already present locally.
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                images: HashSet::from([image.into()]),
                ..Default::default()
            }),
        }
    }

    /// Make every later call to `op` (a trait method name) fail.
    pub async fn fail_on(&self, op: &str, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .failures
            .insert(op.to_string(), message.into());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Queue a canned result for the next `exec`.
    pub async fn push_exec_response(&self, output: ExecOutput) {
        self.state.lock().await.exec_responses.push_back(output);
    }

    /// Every call made so far, as `op` or `op:target`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Commands passed to `exec`, with the container they ran in.
    pub async fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().await.exec_log.clone()
    }

    pub async fn container(&self, id: &str) -> Option<MockContainer> {
        self.state
            .lock()
            .await
            .containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn containers(&self) -> Vec<MockContainer> {
        self.state.lock().await.containers.clone()
    }

    pub async fn has_image(&self, image: &str) -> bool {
        self.state.lock().await.images.contains(image)
    }

    /// Force a container into a daemon state, e.g. `exited`.
    pub async fn set_state(&self, id: &str, state: &str) -> Result<()> {
        self.state.lock().await.container_mut("set state", id)?.state = state.to_string();
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<()> {
        self.state.lock().await.record("ping", "")
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.record("image_exists", image)?;
        Ok(state.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("pull_image", image)?;
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, name: Option<&str>, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().await;
        state.record("create_container", name.unwrap_or_default())?;

        if !state.images.contains(&spec.image) {
            return Err(Error::container(
                "create container",
                format!("No such image: {}", spec.image),
            ));
        }
        if let Some(name) = name {
            if state.containers.iter().any(|c| c.name.as_deref() == Some(name)) {
                return Err(Error::container(
                    "create container",
                    format!("Conflict. The container name \"/{}\" is already in use", name),
                ));
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        state.containers.push(MockContainer {
            id: id.clone(),
            name: name.map(str::to_string),
            spec: spec.clone(),
            state: "created".to_string(),
            created: chrono::Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("start_container", id)?;
        state.container_mut("start container", id)?.state = "running".to_string();
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("stop_container", id)?;
        state.container_mut("stop container", id)?.state = "exited".to_string();
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("remove_container", id)?;
        state.container_mut("remove container", id)?;
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: &[String], _working_dir: &str) -> Result<ExecOutput> {
        let mut state = self.state.lock().await;
        state.record("exec", id)?;
        let container = state.container_mut("exec in", id)?;
        if container.state != "running" {
            return Err(Error::container(
                format!("exec in {}", id),
                format!("Container {} is not running", id),
            ));
        }
        state.exec_log.push((id.to_string(), cmd.to_vec()));
        Ok(state.exec_responses.pop_front().unwrap_or(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    async fn list_containers(&self, label: (&str, &str)) -> Result<Vec<ContainerSummary>> {
        let mut state = self.state.lock().await;
        state.record("list_containers", "")?;
        Ok(state
            .containers
            .iter()
            .filter(|c| c.spec.labels.get(label.0).map(String::as_str) == Some(label.1))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                labels: c.spec.labels.clone(),
                state: c.state.clone(),
                created: c.created,
            })
            .collect())
    }

    async fn commit_container(&self, id: &str, request: &CommitRequest) -> Result<String> {
        let mut state = self.state.lock().await;
        state.record("commit_container", id)?;
        state.container_mut("commit container", id)?;

        let image_id = format!("sha256:{}", uuid::Uuid::new_v4().simple());
        state.images.insert(request.reference());
        state.images.insert(image_id.clone());
        Ok(image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Hardening;

    fn spec(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.into(),
            labels: HashMap::from([("shieldbox.managed".to_string(), "true".to_string())]),
            env: vec![],
            cmd: None,
            working_dir: "/workspace".into(),
            mounts: vec![],
            hardening: Hardening {
                security_opt: vec![],
                cap_drop: vec![],
                cap_add: vec![],
                network_mode: None,
                memory_bytes: None,
                nano_cpus: None,
                runtime: None,
            },
            tty: true,
            open_stdin: true,
        }
    }

    #[tokio::test]
    async fn test_mock_lifecycle() {
        let runtime = MockRuntime::with_image("img");
        let id = runtime.create_container(Some("one"), &spec("img")).await.unwrap();
        runtime.start_container(&id).await.unwrap();

        runtime
            .push_exec_response(ExecOutput {
                exit_code: 0,
                stdout: "hello".into(),
                stderr: String::new(),
            })
            .await;
        let out = runtime
            .exec(&id, &["echo".into(), "hello".into()], "/workspace")
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello");

        let listed = runtime.list_containers(("shieldbox.managed", "true")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, "running");

        runtime.stop_container(&id, Duration::from_secs(1)).await.unwrap();
        runtime.remove_container(&id).await.unwrap();
        assert!(runtime.containers().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_and_name_conflict() {
        let runtime = MockRuntime::new();
        assert!(runtime.create_container(None, &spec("img")).await.is_err());

        runtime.pull_image("img").await.unwrap();
        runtime.create_container(Some("dup"), &spec("img")).await.unwrap();
        assert!(runtime.create_container(Some("dup"), &spec("img")).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let runtime = MockRuntime::with_image("img");
        let id = runtime.create_container(None, &spec("img")).await.unwrap();
        runtime.fail_on("stop_container", "daemon hiccup").await;

        let err = runtime.stop_container(&id, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("daemon hiccup"));

        runtime.clear_failures().await;
        runtime.stop_container(&id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            runtime.calls().await.iter().filter(|c| c.starts_with("stop_container")).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_commit_registers_image() {
        let runtime = MockRuntime::with_image("img");
        let id = runtime.create_container(None, &spec("img")).await.unwrap();
        let request = CommitRequest {
            repo: "shieldbox/checkpoint".into(),
            tag: "sb-cp-1".into(),
            comment: "snap".into(),
            pause: true,
        };
        let image = runtime.commit_container(&id, &request).await.unwrap();
        assert!(runtime.has_image(&image).await);
        assert!(runtime.has_image("shieldbox/checkpoint:sb-cp-1").await);
    }
}
