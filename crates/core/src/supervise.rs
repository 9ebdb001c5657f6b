//! Child process supervision
//!
//! Runs a child to completion while forwarding termination signals to it.
//! The parent never returns before the child has exited, so an interrupted
//! run cannot leave an orphaned container behind.

use crate::errors::{GateError, Result};
use std::future::Future;
use std::process::ExitStatus;
use tokio::process::Child;
use tracing::{debug, info};

/// Convert an exit status into a shell-style exit code.
///
/// A child killed by a signal maps to `128 + signo`; a status with neither a
/// code nor a signal maps to 1.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Wait for `child`, forwarding SIGINT/SIGTERM/SIGHUP to it.
///
/// `on_terminate` runs once, after the first forwarded signal, and is where
/// callers release external resources (e.g. stop the named container).
/// The child's final exit code is returned after it has exited.
#[cfg(unix)]
pub async fn wait_forwarding_signals<F, Fut>(child: &mut Child, mut on_terminate: F) -> Result<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    use nix::sys::signal::Signal;
    use tokio::signal::unix::{signal, SignalKind};

    let install = |kind: SignalKind| {
        signal(kind).map_err(|e| GateError::Supervision(format!("signal handler: {}", e)))
    };
    let mut sigterm = install(SignalKind::terminate())?;
    let mut sigint = install(SignalKind::interrupt())?;
    let mut sighup = install(SignalKind::hangup())?;
    let mut terminating = false;

    loop {
        let received = tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| GateError::Supervision(format!("wait failed: {}", e)))?;
                return Ok(exit_code_of(status));
            }
            _ = sigterm.recv() => Signal::SIGTERM,
            _ = sigint.recv() => Signal::SIGINT,
            _ = sighup.recv() => Signal::SIGHUP,
        };

        info!("Received {}, forwarding to child", received);
        forward_signal(child, received);

        if !terminating {
            terminating = true;
            on_terminate().await;
        }
    }
}

/// Wait for `child`, killing it on Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_forwarding_signals<F, Fut>(child: &mut Child, mut on_terminate: F) -> Result<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut terminating = false;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| GateError::Supervision(format!("wait failed: {}", e)))?;
                return Ok(exit_code_of(status));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping child");
                if let Err(e) = child.start_kill() {
                    debug!("Failed to kill child: {}", e);
                }
                if !terminating {
                    terminating = true;
                    on_terminate().await;
                }
            }
        }
    }
}

#[cfg(unix)]
fn forward_signal(child: &Child, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        debug!("Child already exited; nothing to forward");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        debug!("Failed to forward {} to pid {}: {}", signal, pid, e);
    }
}
