//! Install-then-build pipeline for Node projects

use std::collections::BTreeMap;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::deploy::process::{CommandSpec, ProcessRunner};
use crate::deploy::sink::LogSink;
use crate::errors::DeployerError;

/// One named step of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl BuildStep {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// How a build ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed,
    Cancelled,
}

/// Runs the build steps in order, stopping at the first failure
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    steps: Vec<BuildStep>,
    runner: ProcessRunner,
}

impl BuildPipeline {
    pub fn new(steps: Vec<BuildStep>, runner: ProcessRunner) -> Self {
        Self { steps, runner }
    }

    /// `<pm> install` followed by `<pm> run build`
    pub fn node(package_manager: &str, runner: ProcessRunner) -> Self {
        Self::new(
            vec![
                BuildStep::new("install", package_manager, &["install"]),
                BuildStep::new("build", package_manager, &["run", "build"]),
            ],
            runner,
        )
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Run every step in `cwd` with `env` layered over the inherited environment
    pub async fn build(
        &self,
        cwd: &Path,
        env: &BTreeMap<String, String>,
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, DeployerError> {
        for step in &self.steps {
            if cancel.is_cancelled() {
                return Ok(BuildOutcome::Cancelled);
            }

            let spec = CommandSpec::new(&step.program)
                .args(step.args.iter().cloned())
                .current_dir(cwd)
                .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())));

            info!("Running {} step: {}", step.name, spec.display());
            sink.line(format!("$ {}", spec.display())).await;

            match self.runner.stream(&spec, sink, cancel).await {
                Ok(()) => {}
                Err(DeployerError::Cancelled) => return Ok(BuildOutcome::Cancelled),
                Err(DeployerError::ProcessFailed { code, message, .. }) => {
                    return Err(DeployerError::BuildStepFailed {
                        step: step.name.clone(),
                        code,
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(BuildOutcome::Completed)
    }
}
