//! Container runtime abstraction for Docker/Podman
//!
//! The runner only needs three things from a container runtime: a health check,
//! a blocking foreground launch of the same program inside an image, and a
//! best-effort stop used when the parent is asked to terminate. Docker and
//! Podman share a compatible CLI, so a single [`CliRuntime`] drives both.

use crate::errors::{CirunError, GateError, Result};
use crate::launch::LaunchSpec;
use crate::supervise;
use std::process::Stdio;
use tracing::{debug, instrument, warn};

/// Status the docker/podman CLI uses when the runtime itself failed to start
/// the container (daemon error, image pull failure, invalid flags).
///
/// A containerized phase that exits with this status cannot be told apart
/// from a launch failure and is reported as one.
pub const RUNTIME_LAUNCH_FAILURE_STATUS: i32 = 125;

/// Container runtime abstraction
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Get the name/type of this runtime (e.g., "docker", "podman")
    fn runtime_name(&self) -> &str;

    /// Health check for runtime daemon availability
    async fn ping(&self) -> Result<()>;

    /// Launch the containerized child in the foreground and return its exit status.
    ///
    /// Blocks until the child exits. Termination signals received meanwhile are
    /// forwarded to the child before its status is relayed.
    async fn run(&self, spec: &LaunchSpec) -> Result<i32>;

    /// Stop a named container, best effort
    async fn stop(&self, name: &str) -> Result<()>;

    /// Full argv (binary first) used to launch `spec`
    fn command_line(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut argv = vec![self.runtime_name().to_string()];
        argv.extend(spec.to_run_args());
        argv
    }
}

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = CirunError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(CirunError::Config(crate::errors::ConfigError::Validation {
                message: format!(
                    "Unknown runtime: {}. Supported runtimes: docker, podman",
                    s
                ),
            })),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic CLI-based container runtime implementation
#[derive(Debug, Clone)]
pub struct CliRuntime {
    kind: RuntimeKind,
    /// Container runtime CLI binary path (e.g., "docker" or "/usr/bin/podman")
    runtime_path: String,
}

impl CliRuntime {
    /// Create a runtime for `kind` using its default binary name
    pub fn new(kind: RuntimeKind) -> Self {
        Self {
            kind,
            runtime_path: kind.as_str().to_string(),
        }
    }

    /// Create a runtime for `kind` with a custom binary path
    pub fn with_runtime_path(kind: RuntimeKind, runtime_path: String) -> Self {
        Self { kind, runtime_path }
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new(RuntimeKind::Docker)
    }
}

impl ContainerRuntime for CliRuntime {
    fn runtime_name(&self) -> &str {
        self.kind.as_str()
    }

    fn command_line(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut argv = vec![self.runtime_path.clone()];
        argv.extend(spec.to_run_args());
        argv
    }

    #[instrument(skip(self), fields(runtime = %self.runtime_path))]
    async fn ping(&self) -> Result<()> {
        debug!("Pinging container runtime daemon");

        let output = tokio::process::Command::new(&self.runtime_path)
            .args(["version", "--format", "json"])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                debug!("Container runtime daemon is available");
                Ok(())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(GateError::Unreachable {
                    runtime: self.runtime_path.clone(),
                    message: stderr.trim().to_string(),
                }
                .into())
            }
            Err(e) => {
                debug!("Runtime ping failed: {}", e);
                Err(GateError::NotInstalled {
                    runtime: self.runtime_path.clone(),
                }
                .into())
            }
        }
    }

    #[instrument(skip(self, spec), fields(image = %spec.image, name = %spec.name))]
    async fn run(&self, spec: &LaunchSpec) -> Result<i32> {
        let args = spec.to_run_args();
        debug!("Runtime run args: {:?}", args);

        let mut child = tokio::process::Command::new(&self.runtime_path)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                debug!("Failed to spawn runtime: {}", e);
                GateError::NotInstalled {
                    runtime: self.runtime_path.clone(),
                }
            })?;

        let runtime = self;
        let name = spec.name.as_str();
        let code = supervise::wait_forwarding_signals(&mut child, move || async move {
            if let Err(e) = runtime.stop(name).await {
                warn!("Failed to stop container {}: {}", name, e);
            }
        })
        .await?;

        // 125 is ambiguous: a phase exiting 125 inside the container looks the same
        if code == RUNTIME_LAUNCH_FAILURE_STATUS {
            warn!(
                "Runtime exited with status {}; treating it as a launch failure (a phase exiting {} is reported the same way)",
                code, code
            );
            return Err(GateError::LaunchFailed {
                image: spec.image.clone(),
                status: code,
            }
            .into());
        }

        debug!("Containerized child exited with status {}", code);
        Ok(code)
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> Result<()> {
        debug!("Stopping container: {}", name);

        let output = tokio::process::Command::new(&self.runtime_path)
            .args(["stop", name])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| GateError::Supervision(format!("Failed to run stop command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GateError::Supervision(format!(
                "Runtime stop command failed: {}",
                stderr.trim()
            ))
            .into());
        }

        Ok(())
    }
}

pub mod mock {
    //! Mock container runtime for testing gate and dispatcher flows
    //!
    //! Records every launch so tests can assert on image, mount and command
    //! without a Docker daemon.

    use super::ContainerRuntime;
    use crate::errors::{GateError, Result};
    use crate::launch::LaunchSpec;
    use std::sync::{Arc, Mutex};

    /// Configuration for mock responses
    #[derive(Debug, Clone)]
    pub struct MockRuntimeConfig {
        /// Whether `ping` reports the daemon as unreachable
        pub unavailable: bool,
        /// Exit status returned by `run`
        pub exit_code: i32,
        /// Whether `run` fails as if the image could not be started
        pub launch_fails: bool,
    }

    impl Default for MockRuntimeConfig {
        fn default() -> Self {
            Self {
                unavailable: false,
                exit_code: 0,
                launch_fails: false,
            }
        }
    }

    /// Mock runtime recording launches
    #[derive(Debug, Clone, Default)]
    pub struct MockRuntime {
        config: MockRuntimeConfig,
        launches: Arc<Mutex<Vec<LaunchSpec>>>,
        stops: Arc<Mutex<Vec<String>>>,
    }

    impl MockRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_config(config: MockRuntimeConfig) -> Self {
            Self {
                config,
                ..Self::default()
            }
        }

        /// Launches recorded so far
        pub fn launches(&self) -> Vec<LaunchSpec> {
            self.launches.lock().unwrap().clone()
        }

        /// Container names passed to `stop`
        pub fn stops(&self) -> Vec<String> {
            self.stops.lock().unwrap().clone()
        }
    }

    impl ContainerRuntime for MockRuntime {
        fn runtime_name(&self) -> &str {
            "mock"
        }

        async fn ping(&self) -> Result<()> {
            if self.config.unavailable {
                return Err(GateError::Unreachable {
                    runtime: "mock".to_string(),
                    message: "Cannot connect to the runtime daemon".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn run(&self, spec: &LaunchSpec) -> Result<i32> {
            self.launches.lock().unwrap().push(spec.clone());
            if self.config.launch_fails {
                return Err(GateError::LaunchFailed {
                    image: spec.image.clone(),
                    status: super::RUNTIME_LAUNCH_FAILURE_STATUS,
                }
                .into());
            }
            Ok(self.config.exit_code)
        }

        async fn stop(&self, name: &str) -> Result<()> {
            self.stops.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }
}
