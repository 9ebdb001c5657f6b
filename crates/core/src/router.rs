//! Phase router
//!
//! Maps each phase to exactly one handler and runs only the handler for the
//! requested phase. Handlers are independent units: the router never runs
//! one phase as a prerequisite of another.

use crate::errors::{CirunError, ConfigError, PhaseError, Result};
use crate::phase::Phase;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Outcome of running one phase's logic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub phase: Phase,
    /// Status of the phase: 0 on success, otherwise the failing command's status
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Status of each command run, in order
    pub command_exit_codes: Vec<i32>,
    /// Wall-clock time spent in the handler
    pub duration_ms: u64,
}

impl InvocationResult {
    /// Empty, successful result
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            command_exit_codes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record one command; the first non-zero status becomes the phase status
    pub fn add_command_result(&mut self, exit_code: i32, stdout: &str, stderr: &str) {
        self.command_exit_codes.push(exit_code);
        self.stdout.push_str(stdout);
        self.stderr.push_str(stderr);
        if exit_code != 0 && self.exit_code == 0 {
            self.exit_code = exit_code;
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Inputs handed to a phase handler
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    pub phase: Phase,
    /// Directory the handler runs in
    pub working_dir: PathBuf,
    /// Environment the handler runs with, passed through unmodified
    pub environment: BTreeMap<String, String>,
}

/// User-supplied logic for one phase
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// Run the phase. An `Err` is reported as a logic failure.
    async fn run(&self, ctx: &PhaseContext) -> anyhow::Result<InvocationResult>;
}

/// Registry of phase handlers
#[derive(Default, Clone)]
pub struct PhaseRouter {
    handlers: HashMap<Phase, Arc<dyn PhaseHandler>>,
}

impl PhaseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `phase`, replacing any previous one
    pub fn register(&mut self, phase: Phase, handler: Arc<dyn PhaseHandler>) -> &mut Self {
        self.handlers.insert(phase, handler);
        self
    }

    pub fn has_handler(&self, phase: Phase) -> bool {
        self.handlers.contains_key(&phase)
    }

    /// Look up the handler for `phase`; a missing handler is a configuration error
    pub fn handler(&self, phase: Phase) -> Result<Arc<dyn PhaseHandler>> {
        self.handlers.get(&phase).cloned().ok_or_else(|| {
            ConfigError::MissingHandler {
                phase: phase.to_string(),
            }
            .into()
        })
    }

    /// Parse `raw` and dispatch it; invalid names fail before any handler runs
    pub async fn dispatch_arg(&self, raw: &str, ctx: &PhaseContext) -> Result<InvocationResult> {
        let phase: Phase = raw.parse()?;
        self.dispatch(phase, ctx).await
    }

    /// Run the handler registered for `phase` and return its result verbatim.
    ///
    /// The handler runs on its own task so that a panic is reported as a
    /// logic failure carrying the panic message.
    #[instrument(skip(self, ctx), fields(phase = %phase))]
    pub async fn dispatch(&self, phase: Phase, ctx: &PhaseContext) -> Result<InvocationResult> {
        let handler = self.handler(phase)?;
        let mut ctx = ctx.clone();
        ctx.phase = phase;

        debug!("Dispatching phase {}", phase);
        let start = Instant::now();
        let joined = tokio::spawn(async move { handler.run(&ctx).await }).await;
        let elapsed = start.elapsed();

        let mut result = match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Phase {} handler failed: {:#}", phase, e);
                return Err(into_logic_failure(phase, e));
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                error!("Phase {} handler panicked: {}", phase, message);
                return Err(PhaseError::Panicked {
                    phase: phase.to_string(),
                    message,
                }
                .into());
            }
        };

        result.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(
            "Phase {} finished with exit code {} in {:?}",
            phase, result.exit_code, elapsed
        );
        Ok(result)
    }
}

impl std::fmt::Debug for PhaseRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut phases: Vec<_> = self.handlers.keys().collect();
        phases.sort();
        f.debug_struct("PhaseRouter")
            .field("phases", &phases)
            .finish()
    }
}

/// Keep a handler's own phase error as is; wrap anything else with its full message
fn into_logic_failure(phase: Phase, error: anyhow::Error) -> CirunError {
    match error.downcast::<PhaseError>() {
        Ok(phase_error) => phase_error.into(),
        Err(other) => PhaseError::Handler {
            phase: phase.to_string(),
            message: format!("{:#}", other),
        }
        .into(),
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
