//! Runtime utilities for creating container runtimes from resolved configuration

use cirun_core::config::RunnerConfig;
use cirun_core::runtime::CliRuntime;

/// Create the runtime selected by `config`, honoring a custom binary path
pub fn create_runtime(config: &RunnerConfig) -> CliRuntime {
    match &config.runtime_path {
        Some(path) => CliRuntime::with_runtime_path(config.runtime, path.clone()),
        None => CliRuntime::new(config.runtime),
    }
}
