//! Dry-run implementation
//!
//! Prints what `cirun <phase>` would do as a single JSON document on stdout.
//! Nothing is prompted, launched or executed.

use super::Invocation;
use anyhow::Result;
use tracing::{debug, instrument};

/// Print the resolved plan for `phase`
#[instrument(skip(invocation))]
pub fn execute_plan(invocation: &Invocation, phase: &str) -> Result<()> {
    let plan = invocation.dispatcher().plan(phase)?;
    debug!("Resolved plan: {:?}", plan);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
