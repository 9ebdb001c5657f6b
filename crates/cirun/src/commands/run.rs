//! Run command implementation
//!
//! Runs the phase locally or inside the container and returns the status the
//! process should exit with.

use super::Invocation;
use tracing::instrument;

/// Execute the phase
#[instrument(skip(invocation))]
pub async fn execute_run(invocation: &Invocation, phase: &str) -> i32 {
    invocation.dispatcher().execute(phase).await
}
