//! Top-level invocation flow
//!
//! Ties the pieces together for one `cirun <phase>` call: the phase name is
//! validated first, then the handler lookup, then the environment gate. A
//! local decision dispatches through the [`PhaseRouter`]; a container decision
//! checks the runtime and relays the containerized child's status.

use crate::config::RunnerConfig;
use crate::context::ExecutionContext;
use crate::errors::{exit_codes, CirunError, Result};
use crate::gate::{Confirm, Decision, EnvironmentGate};
use crate::launch::LaunchSpec;
use crate::phase::Phase;
use crate::router::{InvocationResult, PhaseContext, PhaseRouter};
use crate::runtime::ContainerRuntime;
use serde::Serialize;
use tracing::{error, info, instrument};

/// How an invocation finished when no error was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The phase ran in this process
    Local(InvocationResult),
    /// The phase ran in a container; its status is relayed unchanged
    Container { image: String, exit_code: i32 },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Local(result) => result.exit_code,
            Self::Container { exit_code, .. } => *exit_code,
        }
    }
}

/// What an invocation would do, without doing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub phase: Phase,
    #[serde(flatten)]
    pub decision: Decision,
    pub runtime: String,
    /// Full runtime argv for a container decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Configured shell commands for the phase, when any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handler_commands: Vec<String>,
}

/// Runs one phase invocation end to end
pub struct Dispatcher<'a, R: ContainerRuntime> {
    config: &'a RunnerConfig,
    context: &'a ExecutionContext,
    router: &'a PhaseRouter,
    runtime: &'a R,
    confirm: &'a dyn Confirm,
    tty: bool,
}

impl<'a, R: ContainerRuntime> Dispatcher<'a, R> {
    pub fn new(
        config: &'a RunnerConfig,
        context: &'a ExecutionContext,
        router: &'a PhaseRouter,
        runtime: &'a R,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            config,
            context,
            router,
            runtime,
            confirm,
            tty: false,
        }
    }

    /// Allocate a pseudo-terminal for the containerized child
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    fn gate(&self) -> EnvironmentGate<'_> {
        EnvironmentGate::new(self.context, self.confirm, self.config.assume_yes)
    }

    /// Validate `phase_arg` and make sure a handler exists for it
    fn phase(&self, phase_arg: &str) -> Result<Phase> {
        let phase: Phase = phase_arg.parse()?;
        self.router.handler(phase)?;
        Ok(phase)
    }

    fn phase_context(&self, phase: Phase) -> PhaseContext {
        PhaseContext {
            phase,
            working_dir: self.config.mount_path.clone(),
            environment: self.context.environment.clone(),
        }
    }

    /// Run the invocation for `phase_arg`
    #[instrument(skip(self))]
    pub async fn run(&self, phase_arg: &str) -> Result<Outcome> {
        let phase = self.phase(phase_arg)?;

        match self.gate().resolve()? {
            Decision::RunLocally => {
                let ctx = self.phase_context(phase);
                let result = self.router.dispatch(phase, &ctx).await?;
                Ok(Outcome::Local(result))
            }
            Decision::ReExecInContainer { image, .. } => {
                let spec = LaunchSpec::build(self.config, self.context, phase, self.tty)?;
                self.runtime.ping().await?;
                info!(
                    "Re-running phase {} in {} via {}",
                    phase,
                    image,
                    self.runtime.runtime_name()
                );
                let exit_code = self.runtime.run(&spec).await?;
                Ok(Outcome::Container { image, exit_code })
            }
        }
    }

    /// Run the invocation and reduce it to a process exit status.
    ///
    /// Logs exactly one summary line naming the outcome kind.
    pub async fn execute(&self, phase_arg: &str) -> i32 {
        match self.run(phase_arg).await {
            Ok(outcome) => {
                let code = outcome.exit_code();
                if code == exit_codes::SUCCESS {
                    info!(outcome = "success", exit_code = code, "Phase {} succeeded", phase_arg);
                } else {
                    error!(
                        outcome = "logic_failure",
                        exit_code = code,
                        "Phase {} failed with exit code {}",
                        phase_arg,
                        code
                    );
                }
                code
            }
            Err(e) => {
                report(&e);
                e.exit_code()
            }
        }
    }

    /// Describe what `run` would do. Never prompts and never launches.
    pub fn plan(&self, phase_arg: &str) -> Result<Plan> {
        let phase = self.phase(phase_arg)?;
        let decision = self.gate().decide()?;

        let command = match &decision {
            Decision::RunLocally => None,
            Decision::ReExecInContainer { .. } => {
                let spec = LaunchSpec::build(self.config, self.context, phase, self.tty)?;
                Some(self.runtime.command_line(&spec))
            }
        };

        Ok(Plan {
            phase,
            decision,
            runtime: self.runtime.runtime_name().to_string(),
            command,
            handler_commands: self.config.phases.get(&phase).cloned().unwrap_or_default(),
        })
    }
}

/// Log `e` with its kind and exit status
pub fn report(e: &CirunError) {
    error!(outcome = e.kind(), exit_code = e.exit_code(), "{}", e);
}
