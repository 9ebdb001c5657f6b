//! Pipeline job phases
//!
//! A pipeline job calls the runner once per phase. Phases are independent:
//! nothing here orders or chains them.

use crate::errors::CirunError;
use serde::{Deserialize, Serialize};

/// Lifecycle segment requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Preparation before the main script (`before_script` in most pipelines)
    #[serde(alias = "pre-script")]
    PreScript,
    /// The job's main logic
    Script,
    /// Cleanup or reporting after the main script
    #[serde(alias = "after-script")]
    AfterScript,
}

impl Phase {
    /// Canonical command-line name
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreScript => "prescript",
            Phase::Script => "script",
            Phase::AfterScript => "afterscript",
        }
    }

    /// All phases, in the order a pipeline usually invokes them
    pub fn all() -> &'static [Phase] {
        &[Phase::PreScript, Phase::Script, Phase::AfterScript]
    }
}

impl std::str::FromStr for Phase {
    type Err = CirunError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prescript" | "pre-script" => Ok(Phase::PreScript),
            "script" => Ok(Phase::Script),
            "afterscript" | "after-script" => Ok(Phase::AfterScript),
            "" => Err(CirunError::Usage {
                message: "missing phase argument; expected one of: prescript, script, afterscript"
                    .to_string(),
            }),
            _ => Err(CirunError::Usage {
                message: format!(
                    "unknown phase '{}'; expected one of: prescript, script, afterscript",
                    s
                ),
            }),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
