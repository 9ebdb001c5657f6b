//! Container launch description
//!
//! A [`LaunchSpec`] is the fully resolved description of re-running the same
//! program and phase inside the target image: which image, what gets mounted
//! where, which environment variables are forwarded and the command to run.

use crate::config::{RunnerConfig, CONFIG_ENV, MARKER_VAR_ENV};
use crate::context::ExecutionContext;
use crate::errors::{GateError, Result};
use crate::phase::Phase;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Host-specific variables that would break or mislead the containerized run
pub const DEFAULT_PASSTHROUGH_EXCLUDE: &[&str] = &[
    "PATH", "HOME", "HOSTNAME", "PWD", "OLDPWD", "SHLVL", "TMPDIR", "_",
];

/// Container-side location of a configuration file living outside the mount
pub const CONTAINER_CONFIG_PATH: &str = "/etc/cirun/cirun.toml";

/// Everything needed to start the containerized child
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub image: String,
    /// Host directory bind-mounted into the container
    pub mount_source: PathBuf,
    /// Container-side mount target, also the working directory
    pub workdir: String,
    /// Container name, used to stop it on termination
    pub name: String,
    /// Marker variable set inside the container
    pub marker_var: String,
    /// Container-side path of the configuration file the host resolved
    pub config_path: Option<String>,
    /// Host configuration file bind-mounted read-only at `config_path`
    pub config_mount: Option<PathBuf>,
    /// Variables forwarded by name; values are read from the parent environment
    pub env_names: Vec<String>,
    /// Program, its arguments, then the phase
    pub command: Vec<String>,
    /// Allocate a pseudo-terminal
    pub tty: bool,
}

impl LaunchSpec {
    /// Build the launch description for `phase`.
    ///
    /// Fails with [`GateError::MissingImage`] when no image is configured.
    pub fn build(
        config: &RunnerConfig,
        ctx: &ExecutionContext,
        phase: Phase,
        tty: bool,
    ) -> Result<Self> {
        let image = ctx.image.clone().ok_or(GateError::MissingImage)?;

        let mut command = container_program(config, ctx);
        command.push(phase.as_str().to_string());

        let (config_path, config_mount) = match &config.source {
            Some(source) => {
                match translate_into_workdir(source, &ctx.mount_path, &config.workdir) {
                    Some(inside) => (Some(inside), None),
                    None => (
                        Some(CONTAINER_CONFIG_PATH.to_string()),
                        Some(source.clone()),
                    ),
                }
            }
            None => (None, None),
        };

        Ok(Self {
            image,
            mount_source: ctx.mount_path.clone(),
            workdir: config.workdir.clone(),
            name: container_name(phase),
            marker_var: config.marker_var.clone(),
            config_path,
            config_mount,
            env_names: passthrough_names(ctx, config),
            command,
            tty,
        })
    }

    /// Arguments following the runtime binary (`run ...`)
    pub fn to_run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
        if self.tty {
            args.push("-t".to_string());
        }
        args.push("--name".to_string());
        args.push(self.name.clone());
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.mount_source.display(), self.workdir));
        args.push("-w".to_string());
        args.push(self.workdir.clone());
        args.push("-e".to_string());
        args.push(format!("{}=1", self.marker_var));
        // The child resolves its own configuration; point it at the host's choices
        args.push("-e".to_string());
        args.push(format!("{}={}", MARKER_VAR_ENV, self.marker_var));
        if let Some(path) = &self.config_path {
            if let Some(source) = &self.config_mount {
                args.push("-v".to_string());
                args.push(format!("{}:{}:ro", source.display(), path));
            }
            args.push("-e".to_string());
            args.push(format!("{}={}", CONFIG_ENV, path));
        }
        for name in &self.env_names {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Program to run inside the container.
///
/// Uses `container_command` when configured. Otherwise argv[0] is translated:
/// a path under the mounted directory maps to the same path under the
/// container workdir; anything else falls back to the bare file name, which
/// the image must provide on its PATH.
pub fn container_program(config: &RunnerConfig, ctx: &ExecutionContext) -> Vec<String> {
    if let Some(command) = &config.container_command {
        return command.clone();
    }

    let program = &ctx.program;
    let is_bare_name = program.components().count() == 1 && !program.is_absolute();
    if !is_bare_name {
        let absolute = if program.is_absolute() {
            program.clone()
        } else {
            ctx.mount_path.join(program)
        };
        if let Some(inside) = translate_into_workdir(&absolute, &ctx.mount_path, &config.workdir) {
            return vec![inside];
        }
    }

    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cirun".to_string());
    vec![name]
}

fn translate_into_workdir(path: &Path, mount: &Path, workdir: &str) -> Option<String> {
    let relative = path.strip_prefix(mount).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("{}/{}", workdir.trim_end_matches('/'), parts.join("/")))
}

/// Names of environment variables forwarded into the container, sorted.
///
/// Everything in the snapshot is forwarded except host-specific variables,
/// configured exclusions, the marker itself and the runner's own settings
/// (which the launch sets).
pub fn passthrough_names(ctx: &ExecutionContext, config: &RunnerConfig) -> Vec<String> {
    ctx.environment
        .keys()
        .filter(|name| !name.is_empty() && !name.contains('='))
        .filter(|name| **name != config.marker_var)
        .filter(|name| *name != MARKER_VAR_ENV && *name != CONFIG_ENV)
        .filter(|name| !DEFAULT_PASSTHROUGH_EXCLUDE.contains(&name.as_str()))
        .filter(|name| !config.passthrough_exclude.iter().any(|e| e == *name))
        .cloned()
        .collect()
}

/// Unique container name for this invocation
fn container_name(phase: Phase) -> String {
    format!(
        "cirun-{}-{}-{}",
        phase.as_str(),
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    )
}
