//! Runner configuration
//!
//! Everything the gate and router need is assembled once at startup into a
//! single immutable [`RunnerConfig`]. Values come from, in order of precedence:
//! command-line overrides, `CIRUN_*` environment variables, the `cirun.toml`
//! file, and built-in defaults.
//!
//! ```toml
//! image = "rust:1.80"
//! runtime = "docker"
//! marker_var = "CIRUN_IN_CONTAINER"
//! workdir = "/workspace"
//!
//! [phases]
//! prescript = "echo preparing"
//! script = ["cargo build", "cargo test"]
//! afterscript = "echo done"
//! ```

use crate::errors::{CirunError, ConfigError, Result};
use crate::phase::Phase;
use crate::runtime::RuntimeKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "cirun.toml";

/// Default name of the environment variable marking "inside the container"
pub const DEFAULT_MARKER_VAR: &str = "CIRUN_IN_CONTAINER";

/// Default container-side mount target for the working tree
pub const DEFAULT_WORKDIR: &str = "/workspace";

/// Variable naming the configuration file to load
pub const CONFIG_ENV: &str = "CIRUN_CONFIG";

/// Variable naming the marker variable; set by the launch for the containerized child
pub const MARKER_VAR_ENV: &str = "CIRUN_MARKER_VAR";

/// One command or a list of commands for a phase
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// A single shell command
    Single(String),
    /// Shell commands run in order; the first failure stops the phase
    Many(Vec<String>),
}

impl CommandSpec {
    /// Flatten into the ordered command list
    pub fn into_commands(self) -> Vec<String> {
        match self {
            Self::Single(cmd) => vec![cmd],
            Self::Many(cmds) => cmds,
        }
    }
}

/// `[phases]` table of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhasesSection {
    #[serde(alias = "pre-script")]
    pub prescript: Option<CommandSpec>,
    pub script: Option<CommandSpec>,
    #[serde(alias = "after-script")]
    pub afterscript: Option<CommandSpec>,
}

/// On-disk configuration file (`cirun.toml`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub image: Option<String>,
    pub runtime: Option<String>,
    pub marker_var: Option<String>,
    pub marker_file: Option<PathBuf>,
    pub workdir: Option<String>,
    pub container_command: Option<String>,
    pub assume_yes: Option<bool>,
    #[serde(default)]
    pub passthrough_exclude: Vec<String>,
    #[serde(default)]
    pub phases: PhasesSection,
}

impl ConfigFile {
    /// Load and parse a configuration file
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading runner configuration from {}", path.display());

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            CirunError::Config(ConfigError::Parsing {
                path: origin.display().to_string(),
                message: e.message().to_string(),
            })
        })
    }
}

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub image: Option<String>,
    pub runtime: Option<RuntimeKind>,
    pub runtime_path: Option<String>,
    pub marker_var: Option<String>,
    pub workdir: Option<String>,
    pub mount_path: Option<PathBuf>,
    pub assume_yes: bool,
}

/// Fully resolved, immutable runner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Environment variable whose non-empty value marks "inside the container"
    pub marker_var: String,
    /// Optional sentinel file that also marks "inside the container"
    pub marker_file: Option<PathBuf>,
    /// Image to re-execute in; required only when re-execution happens
    pub image: Option<String>,
    /// Host directory mounted into the container (the working tree)
    pub mount_path: PathBuf,
    /// Container-side mount target and working directory
    pub workdir: String,
    /// Program to run inside the container, if not derived from argv[0]
    pub container_command: Option<Vec<String>>,
    pub runtime: RuntimeKind,
    pub runtime_path: Option<String>,
    pub assume_yes: bool,
    /// Extra variable names never forwarded into the container
    pub passthrough_exclude: Vec<String>,
    /// Shell commands per phase
    pub phases: BTreeMap<Phase, Vec<String>>,
    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl RunnerConfig {
    /// Resolve configuration from overrides, an environment snapshot and the
    /// working directory.
    #[instrument(skip_all, fields(cwd = %cwd.display()))]
    pub fn resolve(
        overrides: &ConfigOverrides,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<Self> {
        let source = Self::locate_config_file(overrides, env, cwd)?;
        let file = match &source {
            Some(path) => ConfigFile::load_from_path(path)?,
            None => ConfigFile::default(),
        };

        let image = overrides
            .image
            .clone()
            .or_else(|| non_empty(env.get("CIRUN_IMAGE")))
            .or(file.image);

        let runtime = match overrides.runtime {
            Some(kind) => kind,
            None => match non_empty(env.get("CIRUN_RUNTIME")).or(file.runtime) {
                Some(raw) => raw.parse()?,
                None => RuntimeKind::default(),
            },
        };

        let runtime_path = overrides
            .runtime_path
            .clone()
            .or_else(|| non_empty(env.get("CIRUN_RUNTIME_PATH")));

        let marker_var = overrides
            .marker_var
            .clone()
            .or_else(|| non_empty(env.get(MARKER_VAR_ENV)))
            .or(file.marker_var)
            .unwrap_or_else(|| DEFAULT_MARKER_VAR.to_string());

        let workdir = overrides
            .workdir
            .clone()
            .or(file.workdir)
            .unwrap_or_else(|| DEFAULT_WORKDIR.to_string());

        let assume_yes = overrides.assume_yes
            || env.get("CIRUN_ASSUME_YES").is_some_and(|v| is_truthy(v))
            || file.assume_yes.unwrap_or(false);

        let container_command = match file.container_command {
            Some(raw) => Some(shell_words::split(&raw).map_err(|e| ConfigError::Parsing {
                path: source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                message: format!("container_command: {}", e),
            })?),
            None => None,
        };

        let mount_path = match &overrides.mount_path {
            Some(path) if path.is_relative() => cwd.join(path),
            Some(path) => path.clone(),
            None => cwd.to_path_buf(),
        };

        let mut phases = BTreeMap::new();
        for (phase, spec) in [
            (Phase::PreScript, file.phases.prescript),
            (Phase::Script, file.phases.script),
            (Phase::AfterScript, file.phases.afterscript),
        ] {
            if let Some(spec) = spec {
                phases.insert(phase, spec.into_commands());
            }
        }

        let config = Self {
            marker_var,
            marker_file: file.marker_file,
            image,
            mount_path,
            workdir,
            container_command,
            runtime,
            runtime_path,
            assume_yes,
            passthrough_exclude: file.passthrough_exclude,
            phases,
            source,
        };
        config.validate()?;

        debug!(
            "Resolved configuration: runtime={}, image={:?}, marker={}",
            config.runtime, config.image, config.marker_var
        );
        Ok(config)
    }

    /// Explicit path (flag, then `CIRUN_CONFIG`) must exist; the default file is optional.
    fn locate_config_file(
        overrides: &ConfigOverrides,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<Option<PathBuf>> {
        let explicit = overrides
            .config_path
            .clone()
            .or_else(|| non_empty(env.get(CONFIG_ENV)).map(PathBuf::from));

        if let Some(path) = explicit {
            let path = if path.is_relative() {
                cwd.join(path)
            } else {
                path
            };
            if !path.is_file() {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            return Ok(Some(path));
        }

        let default = cwd.join(DEFAULT_CONFIG_FILE);
        Ok(default.is_file().then_some(default))
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_env_name(&self.marker_var) {
            return Err(ConfigError::Validation {
                message: format!("marker_var '{}' is not a valid variable name", self.marker_var),
            }
            .into());
        }

        if !self.workdir.starts_with('/') {
            return Err(ConfigError::Validation {
                message: format!("workdir '{}' must be an absolute path", self.workdir),
            }
            .into());
        }

        if let Some(image) = &self.image {
            if image.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: "image must not be empty".to_string(),
                }
                .into());
            }
        }

        if matches!(&self.container_command, Some(cmd) if cmd.is_empty()) {
            return Err(ConfigError::Validation {
                message: "container_command must not be empty".to_string(),
            }
            .into());
        }

        for (phase, commands) in &self.phases {
            if commands.is_empty() || commands.iter().any(|c| c.trim().is_empty()) {
                return Err(ConfigError::Validation {
                    message: format!("phase '{}' contains an empty command", phase),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Truthy values (case-insensitive): `true`, `1`, `yes`
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_config_file() {
        let tmp = TempDir::new().unwrap();
        let config =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap();

        assert_eq!(config.marker_var, DEFAULT_MARKER_VAR);
        assert_eq!(config.workdir, DEFAULT_WORKDIR);
        assert_eq!(config.runtime, RuntimeKind::Docker);
        assert_eq!(config.mount_path, tmp.path());
        assert!(config.image.is_none());
        assert!(config.phases.is_empty());
        assert!(config.source.is_none());
        assert!(!config.assume_yes);
    }

    #[test]
    fn test_loads_default_config_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            r#"
image = "rust:1.80"
runtime = "podman"
container_command = "./ci/cirun --verbose"

[phases]
pre-script = "echo prep"
script = ["cargo build", "cargo test"]
"#,
        )
        .unwrap();

        let config =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap();

        assert_eq!(config.image.as_deref(), Some("rust:1.80"));
        assert_eq!(config.runtime, RuntimeKind::Podman);
        assert_eq!(
            config.container_command,
            Some(vec!["./ci/cirun".to_string(), "--verbose".to_string()])
        );
        assert_eq!(config.phases[&Phase::PreScript], vec!["echo prep"]);
        assert_eq!(
            config.phases[&Phase::Script],
            vec!["cargo build", "cargo test"]
        );
        assert!(!config.phases.contains_key(&Phase::AfterScript));
    }

    #[test]
    fn test_precedence_flag_over_env_over_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "image = \"from-file\"\nruntime = \"podman\"\n",
        )
        .unwrap();

        let from_env = RunnerConfig::resolve(
            &ConfigOverrides::default(),
            &env(&[("CIRUN_IMAGE", "from-env"), ("CIRUN_RUNTIME", "docker")]),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(from_env.image.as_deref(), Some("from-env"));
        assert_eq!(from_env.runtime, RuntimeKind::Docker);

        let overrides = ConfigOverrides {
            image: Some("from-flag".to_string()),
            runtime: Some(RuntimeKind::Podman),
            ..Default::default()
        };
        let from_flag = RunnerConfig::resolve(
            &overrides,
            &env(&[("CIRUN_IMAGE", "from-env"), ("CIRUN_RUNTIME", "docker")]),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(from_flag.image.as_deref(), Some("from-flag"));
        assert_eq!(from_flag.runtime, RuntimeKind::Podman);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("missing.toml")),
            ..Default::default()
        };
        let err = RunnerConfig::resolve(&overrides, &env(&[]), tmp.path()).unwrap_err();
        assert!(matches!(err, CirunError::Config(ConfigError::NotFound { .. })));

        let err = RunnerConfig::resolve(
            &ConfigOverrides::default(),
            &env(&[("CIRUN_CONFIG", "/nonexistent/cirun.toml")]),
            tmp.path(),
        )
        .unwrap_err();
        assert!(matches!(err, CirunError::Config(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "image = [unclosed").unwrap();
        let err =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap_err();
        assert!(matches!(err, CirunError::Config(ConfigError::Parsing { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "imgae = \"typo\"\n").unwrap();
        let err =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap_err();
        assert_eq!(err.exit_code(), crate::errors::exit_codes::CONFIG);
    }

    #[test]
    fn test_validation_errors() {
        let tmp = TempDir::new().unwrap();

        let overrides = ConfigOverrides {
            marker_var: Some("1BAD-NAME".to_string()),
            ..Default::default()
        };
        assert!(RunnerConfig::resolve(&overrides, &env(&[]), tmp.path()).is_err());

        let overrides = ConfigOverrides {
            workdir: Some("relative/dir".to_string()),
            ..Default::default()
        };
        assert!(RunnerConfig::resolve(&overrides, &env(&[]), tmp.path()).is_err());

        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "[phases]\nscript = [\"cargo test\", \"  \"]\n",
        )
        .unwrap();
        let err =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn test_marker_var_from_env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "marker_var = \"FROM_FILE\"\n",
        )
        .unwrap();

        let config = RunnerConfig::resolve(
            &ConfigOverrides::default(),
            &env(&[(MARKER_VAR_ENV, "JOB_READY")]),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(config.marker_var, "JOB_READY");

        let config =
            RunnerConfig::resolve(&ConfigOverrides::default(), &env(&[]), tmp.path()).unwrap();
        assert_eq!(config.marker_var, "FROM_FILE");
    }

    #[test]
    fn test_assume_yes_sources() {
        let tmp = TempDir::new().unwrap();
        let config = RunnerConfig::resolve(
            &ConfigOverrides::default(),
            &env(&[("CIRUN_ASSUME_YES", "Yes")]),
            tmp.path(),
        )
        .unwrap();
        assert!(config.assume_yes);

        let config = RunnerConfig::resolve(
            &ConfigOverrides::default(),
            &env(&[("CIRUN_ASSUME_YES", "0")]),
            tmp.path(),
        )
        .unwrap();
        assert!(!config.assume_yes);
    }

    #[test]
    fn test_relative_mount_path_joins_cwd() {
        let tmp = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            mount_path: Some(PathBuf::from("sub")),
            ..Default::default()
        };
        let config = RunnerConfig::resolve(&overrides, &env(&[]), tmp.path()).unwrap();
        assert_eq!(config.mount_path, tmp.path().join("sub"));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("no"));
        assert!(!is_truthy(""));
    }
}
