use crate::commands::plan::execute_plan;
use crate::commands::run::execute_run;
use crate::commands::Invocation;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use cirun_core::config::ConfigOverrides;
use std::collections::HashMap;
use std::path::PathBuf;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for cirun_core::runtime::RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => cirun_core::runtime::RuntimeKind::Docker,
            RuntimeOption::Podman => cirun_core::runtime::RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cirun",
    version,
    about = "Run CI pipeline phases locally",
    long_about = "Run CI pipeline phases locally\n\nRuns a phase (prescript, script, afterscript) directly when already inside the CI container, otherwise re-runs the same command inside the configured image.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Phase to run: prescript, script or afterscript
    #[arg(value_name = "PHASE")]
    pub phase: Option<String>,

    /// Log format (text or json, defaults to text, can be set via CIRUN_LOG_FORMAT env var)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (defaults to ./cirun.toml, can be set via CIRUN_CONFIG)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Container image to re-run in (can be set via CIRUN_IMAGE)
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Container runtime to use (docker or podman, can be set via CIRUN_RUNTIME env var)
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the container runtime executable (can be set via CIRUN_RUNTIME_PATH)
    #[arg(long, value_name = "PATH")]
    pub runtime_path: Option<String>,

    /// Environment variable marking the inside of the CI container
    #[arg(long, value_name = "NAME")]
    pub marker_var: Option<String>,

    /// Container-side directory the project is mounted at
    #[arg(long, value_name = "PATH")]
    pub workdir: Option<String>,

    /// Host directory mounted into the container (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub mount: Option<PathBuf>,

    /// Re-run in the container without asking (can be set via CIRUN_ASSUME_YES)
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the resolved plan as JSON and exit without running anything
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            image: self.image.clone(),
            runtime: self.runtime.map(Into::into),
            runtime_path: self.runtime_path.clone(),
            marker_var: self.marker_var.clone(),
            workdir: self.workdir.clone(),
            mount_path: self.mount.clone(),
            assume_yes: self.yes,
        }
    }

    /// Run the invocation and return the process exit status
    pub async fn dispatch(self) -> Result<i32> {
        let env: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };

        let log_level = self.log_level.as_str();
        cirun_core::logging::init_with_filter(
            log_format,
            &format!("cirun={},cirun_core={}", log_level, log_level),
        )?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let phase = self.phase.clone().unwrap_or_default();
        let invocation = Invocation::prepare(&phase, &self.overrides(), env)?;

        if self.dry_run {
            execute_plan(&invocation, &phase)?;
            Ok(cirun_core::errors::exit_codes::SUCCESS)
        } else {
            Ok(execute_run(&invocation, &phase).await)
        }
    }
}
