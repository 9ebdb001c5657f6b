//! Execution context
//!
//! A snapshot of the facts the environment gate decides on, captured once at
//! process start and never modified afterwards.

use crate::config::RunnerConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Facts about the current process relevant to re-execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// Whether the container marker is present
    pub in_container: bool,
    /// Whether stdin and stderr are attached to a terminal
    pub interactive: bool,
    /// Image to re-execute in, if configured
    pub image: Option<String>,
    /// Host directory to mount
    pub mount_path: PathBuf,
    /// How this program was invoked (argv[0])
    pub program: PathBuf,
    /// Process environment at startup
    pub environment: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Capture the context from configuration and an environment snapshot.
    ///
    /// The marker counts as present when the configured variable is set to a
    /// non-empty value, or when the configured sentinel file exists.
    pub fn capture(
        config: &RunnerConfig,
        environment: impl IntoIterator<Item = (String, String)>,
        interactive: bool,
        program: PathBuf,
    ) -> Self {
        let environment: BTreeMap<String, String> = environment.into_iter().collect();

        let marker_var_set = environment
            .get(&config.marker_var)
            .is_some_and(|v| !v.is_empty());
        let marker_file_present = config
            .marker_file
            .as_ref()
            .is_some_and(|path| path.exists());
        let in_container = marker_var_set || marker_file_present;

        debug!(
            in_container,
            marker_var_set, marker_file_present, interactive, "Captured execution context"
        );

        Self {
            in_container,
            interactive,
            image: config.image.clone(),
            mount_path: config.mount_path.clone(),
            program,
            environment,
        }
    }
}
