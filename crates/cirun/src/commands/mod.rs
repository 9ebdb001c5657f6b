//! Command implementations
//!
//! Both entry points share the same preparation: validate the phase, resolve
//! configuration once, capture the execution context and build the router.

pub mod plan;
pub mod run;

use crate::runtime_utils::create_runtime;
use crate::ui::prompt::TerminalConfirm;
use cirun_core::config::RunnerConfig;
use cirun_core::context::ExecutionContext;
use cirun_core::dispatcher::Dispatcher;
use cirun_core::errors::{ConfigError, Result};
use cirun_core::handler::router_from_config;
use cirun_core::phase::Phase;
use cirun_core::router::PhaseRouter;
use cirun_core::runtime::CliRuntime;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Everything resolved at startup for one invocation
#[derive(Debug)]
pub struct Invocation {
    pub config: RunnerConfig,
    pub context: ExecutionContext,
    pub router: PhaseRouter,
    pub runtime: CliRuntime,
    pub confirm: TerminalConfirm,
    /// Allocate a pseudo-terminal for a containerized child
    pub tty: bool,
}

impl Invocation {
    /// Resolve configuration and context for `phase`.
    ///
    /// The phase name is checked first so a usage error wins over any
    /// configuration problem.
    #[instrument(skip(overrides, env))]
    pub fn prepare(
        phase: &str,
        overrides: &cirun_core::config::ConfigOverrides,
        env: HashMap<String, String>,
    ) -> Result<Self> {
        let _: Phase = phase.parse()?;

        let cwd = std::env::current_dir().map_err(ConfigError::from)?;
        let config = RunnerConfig::resolve(overrides, &env, &cwd)?;

        let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
        let tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let program = std::env::args_os()
            .next()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("cirun"));

        let context = ExecutionContext::capture(&config, env, interactive, program);
        let router = router_from_config(&config);
        let runtime = create_runtime(&config);
        debug!("Prepared invocation: {:?}", router);

        Ok(Self {
            config,
            context,
            router,
            runtime,
            confirm: TerminalConfirm::new(),
            tty,
        })
    }

    pub fn dispatcher(&self) -> Dispatcher<'_, CliRuntime> {
        Dispatcher::new(
            &self.config,
            &self.context,
            &self.router,
            &self.runtime,
            &self.confirm,
        )
        .with_tty(self.tty)
    }
}
