//! Error types and handling
//!
//! The error taxonomy follows the runner's failure kinds: configuration problems,
//! usage errors (bad phase argument), gate errors (container runtime unavailable
//! or misconfigured), user aborts at the containerization prompt, and logic
//! failures raised by phase handlers. Domain enums are wrapped in [`CirunError`]
//! and every variant maps to a distinct process exit code.

use thiserror::Error;

/// Process exit codes used by the runner.
///
/// Logic failures carry the handler's own status and therefore have no
/// constant here; [`exit_codes::LOGIC_FAILURE`] is only used when a handler
/// failed without producing a status of its own.
///
/// A handler status is relayed verbatim even when it equals one of the codes
/// below (2, 64, 69, 78). The exit code alone is then ambiguous; the summary
/// log line (`outcome=...`) still names the actual kind.
pub mod exit_codes {
    /// Phase completed successfully
    pub const SUCCESS: i32 = 0;
    /// Handler failed without an exit status (error value, panic, spawn failure)
    pub const LOGIC_FAILURE: i32 = 1;
    /// User declined the containerization prompt
    pub const USER_ABORTED: i32 = 2;
    /// Bad or missing phase argument (EX_USAGE)
    pub const USAGE: i32 = 64;
    /// Container runtime unavailable or launch failed (EX_UNAVAILABLE)
    pub const GATE: i32 = 69;
    /// Configuration could not be loaded or is incomplete (EX_CONFIG)
    pub const CONFIG: i32 = 78;
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file {path}: {message}")]
    Parsing { path: String, message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// No handler is registered for a valid phase
    #[error("No handler registered for phase '{phase}'")]
    MissingHandler { phase: String },
}

/// Environment gate errors: the container runtime cannot be used
#[derive(Error, Debug)]
pub enum GateError {
    /// Runtime binary is not installed or cannot be spawned
    #[error("Container runtime '{runtime}' is not installed or not accessible")]
    NotInstalled { runtime: String },

    /// Runtime binary exists but the daemon did not answer
    #[error("Container runtime '{runtime}' is unreachable: {message}")]
    Unreachable { runtime: String, message: String },

    /// The runtime itself failed to start the container (image pull, daemon error)
    #[error("Container runtime failed to launch image '{image}' (status {status})")]
    LaunchFailed { image: String, status: i32 },

    /// Re-execution is required but no image was configured
    #[error("No container image configured; set `image` in cirun.toml, CIRUN_IMAGE or --image")]
    MissingImage,

    /// Waiting on or signalling the containerized child failed
    #[error("Container supervision failed: {0}")]
    Supervision(String),
}

/// Errors raised while running phase logic
#[derive(Error, Debug)]
pub enum PhaseError {
    /// A handler returned an error value instead of a result
    #[error("Phase '{phase}' handler failed: {message}")]
    Handler { phase: String, message: String },

    /// A handler panicked
    #[error("Phase '{phase}' handler panicked: {message}")]
    Panicked { phase: String, message: String },

    /// A configured command could not be spawned
    #[error("Failed to spawn command for phase '{phase}': {message}")]
    Spawn { phase: String, message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum CirunError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bad or missing phase argument
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// Container runtime unavailable or misconfigured
    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    /// User declined the containerization prompt
    #[error("Aborted by user: container launch was not confirmed")]
    UserAborted,

    /// Phase logic failed without an exit status of its own
    #[error("Logic failure: {0}")]
    Phase(#[from] PhaseError),
}

impl CirunError {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::CONFIG,
            Self::Usage { .. } => exit_codes::USAGE,
            Self::Gate(_) => exit_codes::GATE,
            Self::UserAborted => exit_codes::USER_ABORTED,
            Self::Phase(_) => exit_codes::LOGIC_FAILURE,
        }
    }

    /// Stable identifier of the failure kind, used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Usage { .. } => "usage_error",
            Self::Gate(_) => "gate_error",
            Self::UserAborted => "user_aborted",
            Self::Phase(_) => "logic_failure",
        }
    }
}

/// Convenience type alias for Results with CirunError
pub type Result<T> = std::result::Result<T, CirunError>;
