//! Finite State Machine for a deployment session

use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentStatus;

/// Session step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Created, not yet accepted
    Idle,

    /// Cloning the repository
    Cloning,

    /// Installing dependencies and building
    Building,

    /// Copying artifacts and refreshing the container
    Publishing,

    /// Terminal
    Done(DeploymentStatus),
}

impl Step {
    /// Section header written to the live log when the step begins
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Step::Cloning => Some("== Git clone/update =="),
            Step::Building => Some("== Build with Node (docker) =="),
            Step::Publishing => Some("== Publish with Nginx =="),
            Step::Idle | Step::Done(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

/// Session event
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Request validated, start cloning
    Accept,

    /// Clone finished
    Cloned,

    /// Build finished
    Built,

    /// Container refreshed
    Published,

    /// Any step failed
    Fail(String),

    /// Client went away
    Cancel,
}

/// Deployment session FSM
#[derive(Debug, Clone)]
pub struct StepMachine {
    step: Step,
    error: Option<String>,
}

impl StepMachine {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            step: Step::Idle,
            error: None,
        }
    }

    /// Get current step
    pub fn step(&self) -> Step {
        self.step
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition
    pub fn process(&mut self, event: SessionEvent) -> Result<Step, String> {
        let next = match (self.step, &event) {
            (Step::Idle, SessionEvent::Accept) => Step::Cloning,

            (Step::Cloning, SessionEvent::Cloned) => Step::Building,
            (Step::Building, SessionEvent::Built) => Step::Publishing,
            (Step::Publishing, SessionEvent::Published) => Step::Done(DeploymentStatus::Success),

            (Step::Cloning | Step::Building | Step::Publishing, SessionEvent::Fail(err)) => {
                self.error = Some(err.clone());
                Step::Done(DeploymentStatus::Failed)
            }

            // Publishing is short and never interrupted
            (Step::Idle | Step::Cloning | Step::Building, SessionEvent::Cancel) => {
                Step::Done(DeploymentStatus::Cancelled)
            }

            // Invalid transitions
            (step, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", step, event));
            }
        };

        self.step = next;
        Ok(next)
    }
}

impl Default for StepMachine {
    fn default() -> Self {
        Self::new()
    }
}
