//! Shell command phase handler
//!
//! Runs the commands configured for a phase one after another through the
//! platform shell. Output is streamed to this process's stdout/stderr byte for
//! byte and captured at the same time. The first failing command ends the
//! phase and its status becomes the phase status.

use crate::config::RunnerConfig;
use crate::errors::PhaseError;
use crate::router::{InvocationResult, PhaseContext, PhaseHandler, PhaseRouter};
use crate::supervise::exit_code_of;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, instrument};

/// Handler running a fixed list of shell commands
#[derive(Debug, Clone)]
pub struct CommandHandler {
    commands: Vec<String>,
    echo: bool,
}

impl CommandHandler {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            echo: true,
        }
    }

    /// Capture output without copying it to this process's stdout/stderr
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    fn shell_command(command: &str) -> tokio::process::Command {
        if cfg!(target_os = "windows") {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }

    #[instrument(skip(self, ctx), fields(phase = %ctx.phase))]
    async fn run_one(
        &self,
        command: &str,
        ctx: &PhaseContext,
    ) -> Result<(i32, Vec<u8>, Vec<u8>), PhaseError> {
        let mut child = Self::shell_command(command)
            .current_dir(&ctx.working_dir)
            .envs(&ctx.environment)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PhaseError::Spawn {
                phase: ctx.phase.to_string(),
                message: format!("{}: {}", command, e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let echo = self.echo;

        let (out, err) = tokio::join!(
            tee(stdout, tokio::io::stdout(), echo),
            tee(stderr, tokio::io::stderr(), echo),
        );

        let status = child.wait().await.map_err(|e| PhaseError::Spawn {
            phase: ctx.phase.to_string(),
            message: format!("failed to wait for '{}': {}", command, e),
        })?;

        let read_error = |e: std::io::Error| PhaseError::Handler {
            phase: ctx.phase.to_string(),
            message: format!("failed to read output of '{}': {}", command, e),
        };
        Ok((exit_code_of(status), out.map_err(read_error)?, err.map_err(read_error)?))
    }
}

#[async_trait]
impl PhaseHandler for CommandHandler {
    async fn run(&self, ctx: &PhaseContext) -> anyhow::Result<InvocationResult> {
        let mut result = InvocationResult::new(ctx.phase);

        for (i, command) in self.commands.iter().enumerate() {
            debug!(
                "Executing command {} of {} for phase {}: {}",
                i + 1,
                self.commands.len(),
                ctx.phase,
                command
            );

            let (code, stdout, stderr) = self.run_one(command, ctx).await?;
            result.add_command_result(
                code,
                &String::from_utf8_lossy(&stdout),
                &String::from_utf8_lossy(&stderr),
            );

            if code != 0 {
                error!(
                    "Command failed in phase {} with exit code {}: {}",
                    ctx.phase, code, command
                );
                break;
            }
        }

        Ok(result)
    }
}

/// Copy `source` into `sink` (when `echo`) while collecting every byte
async fn tee<R, W>(source: Option<R>, mut sink: W, echo: bool) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let Some(mut source) = source else {
        return Ok(captured);
    };

    let mut buf = [0u8; 8192];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if echo {
            sink.write_all(&buf[..n]).await?;
            sink.flush().await?;
        }
        captured.extend_from_slice(&buf[..n]);
    }
    Ok(captured)
}

/// Router with a [`CommandHandler`] for every phase configured in `config`
pub fn router_from_config(config: &RunnerConfig) -> PhaseRouter {
    let mut router = PhaseRouter::new();
    for (phase, commands) in &config.phases {
        router.register(*phase, Arc::new(CommandHandler::new(commands.clone())));
    }
    router
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> PhaseContext {
        let mut environment = BTreeMap::new();
        environment.insert("GREETING".to_string(), "hello".to_string());
        PhaseContext {
            phase: Phase::Script,
            working_dir: dir.path().to_path_buf(),
            environment,
        }
    }

    fn handler(commands: &[&str]) -> CommandHandler {
        CommandHandler::new(commands.iter().map(|c| c.to_string()).collect()).quiet()
    }

    #[tokio::test]
    async fn test_captures_output_and_environment() {
        let tmp = TempDir::new().unwrap();
        let result = handler(&["echo \"$GREETING\"", "echo oops >&2"])
            .run(&ctx(&tmp))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.command_exit_codes, vec![0, 0]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_phase() {
        let tmp = TempDir::new().unwrap();
        let result = handler(&["echo one", "exit 3", "echo never"])
            .run(&ctx(&tmp))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "one\n");
        assert_eq!(result.command_exit_codes, vec![0, 3]);
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "present").unwrap();
        let result = handler(&["cat marker.txt"]).run(&ctx(&tmp)).await.unwrap();
        assert_eq!(result.stdout, "present");
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = ctx(&tmp);
        ctx.working_dir = tmp.path().join("does-not-exist");
        let err = handler(&["true"]).run(&ctx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhaseError>(),
            Some(PhaseError::Spawn { .. })
        ));
    }

    #[test]
    fn test_router_from_config_registers_configured_phases() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("cirun.toml"),
            "[phases]\nscript = \"true\"\nafterscript = [\"true\", \"true\"]\n",
        )
        .unwrap();
        let config = RunnerConfig::resolve(
            &crate::config::ConfigOverrides::default(),
            &std::collections::HashMap::new(),
            tmp.path(),
        )
        .unwrap();
        let router = router_from_config(&config);
        assert!(!router.has_handler(Phase::PreScript));
        assert!(router.has_handler(Phase::Script));
        assert!(router.has_handler(Phase::AfterScript));
    }
}
