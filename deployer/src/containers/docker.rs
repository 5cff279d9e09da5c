//! Docker CLI engine

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::containers::engine::{ContainerEngine, EngineContainer, RunSpec};
use crate::deploy::process::{CommandSpec, ProcessRunner};
use crate::errors::DeployerError;

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: Option<String>,
}

/// Drives a docker-compatible CLI (`docker`, `podman`)
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
    runner: ProcessRunner,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            runner: ProcessRunner::default(),
        }
    }

    async fn exec(&self, operation: &str, args: &[&str]) -> Result<String, DeployerError> {
        let spec = CommandSpec::new(&self.bin).args(args.iter().copied());
        self.runner
            .output(&spec, None)
            .await
            .map_err(|e| engine_error(operation, e))
    }

    /// Start, stop or restart; a missing container is `NotFound`
    async fn lifecycle(&self, operation: &str, name: &str) -> Result<(), DeployerError> {
        info!("docker {} {}", operation, name);
        match self.exec(operation, &[operation, name]).await {
            Ok(_) => Ok(()),
            Err(e) if is_no_such_container(&e) => Err(DeployerError::NotFound(format!(
                "Container {} not found.",
                name
            ))),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn list(&self, prefix: &str) -> Result<Vec<EngineContainer>, DeployerError> {
        let filter = format!("name=^{}", prefix);
        let output = self
            .exec(
                "list",
                &["ps", "-a", "--no-trunc", "--filter", &filter, "--format", "{{json .}}"],
            )
            .await?;
        Ok(parse_ps_output(&output, prefix))
    }

    async fn remove(&self, name: &str) -> Result<bool, DeployerError> {
        // Recent engines exit 0 for `rm -f` of a missing container
        let filter = format!("name=^{}$", escape_regex(name));
        let found = self
            .exec(
                "remove",
                &["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"],
            )
            .await?;
        if !lists_name(&found, name) {
            debug!("Container {} already gone", name);
            return Ok(false);
        }

        debug!("Removing container {}", name);
        match self.exec("remove", &["rm", "-f", name]).await {
            Ok(_) => Ok(true),
            Err(e) if is_no_such_container(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn run(&self, spec: &RunSpec) -> Result<String, DeployerError> {
        let mount = format!(
            "{}:{}:ro",
            spec.mount_source.display(),
            spec.mount_target
        );
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            spec.name.clone(),
            "--restart".into(),
            spec.restart_policy.clone(),
            "-v".into(),
            mount,
        ];
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{}={}", key, value));
        }
        if let Some(network) = &spec.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        args.push(spec.image.clone());

        info!("Running container {} from {}", spec.name, spec.image);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.exec("run", &args).await?;
        Ok(id.trim().to_string())
    }

    async fn start(&self, name: &str) -> Result<(), DeployerError> {
        self.lifecycle("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<(), DeployerError> {
        self.lifecycle("stop", name).await
    }

    async fn restart(&self, name: &str) -> Result<(), DeployerError> {
        self.lifecycle("restart", name).await
    }
}

fn engine_error(operation: &str, err: DeployerError) -> DeployerError {
    match err {
        DeployerError::ProcessFailed { message, .. } => DeployerError::ContainerEngine {
            operation: operation.to_string(),
            message,
        },
        other => other,
    }
}

fn is_no_such_container(err: &DeployerError) -> bool {
    matches!(
        err,
        DeployerError::ContainerEngine { message, .. } if message.contains("No such container")
    )
}

/// Escape regex metacharacters for a `name=` filter
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Whether `ps --format {{.Names}}` output lists exactly `name`
fn lists_name(output: &str, name: &str) -> bool {
    output
        .lines()
        .flat_map(|line| line.split(','))
        .any(|n| n.trim().trim_start_matches('/') == name)
}

/// Parse `docker ps` JSON lines, keeping only names under `prefix`.
///
/// The engine's name filter is a regex match on any part of the name, so
/// the prefix is checked again here.
pub fn parse_ps_output(output: &str, prefix: &str) -> Vec<EngineContainer> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<PsRow>(line) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Skipping unparsable ps line: {}", e);
                None
            }
        })
        .flat_map(|row| {
            // Linked containers list several comma separated names
            let names: Vec<String> = row
                .names
                .split(',')
                .map(|n| n.trim().trim_start_matches('/').to_string())
                .collect();
            names.into_iter().map(move |name| EngineContainer {
                name,
                state: row.state.clone(),
                status: row.status.clone(),
                created_at: row.created_at.clone(),
            })
        })
        .filter(|c| c.name.starts_with(prefix) && c.name.len() > prefix.len())
        .collect()
}
