//! Environment gate
//!
//! Decides whether the current process already runs inside the target
//! container or has to hand off to the container runtime. Asking the user is
//! an injected capability so the decision can be exercised without a terminal.

use crate::context::ExecutionContext;
use crate::errors::{CirunError, GateError, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Marker present: run the phase in this process
    RunLocally,
    /// Marker absent: re-run the same command inside `image` with `mount_path` mounted
    ReExecInContainer { image: String, mount_path: PathBuf },
}

/// Capability answering yes/no questions
pub trait Confirm {
    /// Ask `question`; `Ok(true)` means the user agreed
    fn confirm(&self, question: &str) -> std::io::Result<bool>;
}

/// Confirmation with a predetermined answer
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _question: &str) -> std::io::Result<bool> {
        Ok(self.0)
    }
}

/// The environment gate
pub struct EnvironmentGate<'a> {
    context: &'a ExecutionContext,
    confirm: &'a dyn Confirm,
    assume_yes: bool,
}

impl<'a> EnvironmentGate<'a> {
    pub fn new(context: &'a ExecutionContext, confirm: &'a dyn Confirm, assume_yes: bool) -> Self {
        Self {
            context,
            confirm,
            assume_yes,
        }
    }

    /// Decide without any side effect (no prompt)
    pub fn decide(&self) -> Result<Decision> {
        if self.context.in_container {
            debug!("Container marker present; running locally");
            return Ok(Decision::RunLocally);
        }

        let image = self.context.image.clone().ok_or(GateError::MissingImage)?;
        Ok(Decision::ReExecInContainer {
            image,
            mount_path: self.context.mount_path.clone(),
        })
    }

    /// Decide, asking for confirmation before containerizing an interactive run.
    ///
    /// Returns [`CirunError::UserAborted`] when the user declines or the answer
    /// cannot be read.
    pub fn resolve(&self) -> Result<Decision> {
        let decision = self.decide()?;

        if let Decision::ReExecInContainer { image, .. } = &decision {
            if self.context.interactive && !self.assume_yes {
                let question = format!(
                    "Not running inside the CI container. Re-run in '{}'?",
                    image
                );
                match self.confirm.confirm(&question) {
                    Ok(true) => debug!("Container launch confirmed"),
                    Ok(false) => {
                        info!("Container launch declined");
                        return Err(CirunError::UserAborted);
                    }
                    Err(e) => {
                        warn!("Could not read confirmation: {}", e);
                        return Err(CirunError::UserAborted);
                    }
                }
            }
        }

        Ok(decision)
    }
}
