use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boards::AzScope;

pub const PROJECT_CONFIG_FILE: &str = ".azdo-mcp.toml";
pub const DEFAULT_AZ_COMMAND: &str = "az";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const ENV_HOME: &str = "AZDO_MCP_HOME";
pub const ENV_ORG_URL: &str = "AZDO_ORG_URL";
pub const ENV_PROJECT: &str = "AZDO_PROJECT";
pub const ENV_TEAM: &str = "AZDO_TEAM";
pub const ENV_AZ_COMMAND: &str = "AZDO_AZ_CMD";
pub const ENV_TIMEOUT_SECS: &str = "AZDO_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid az command `{0}`")]
    InvalidCommand(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// On-disk configuration (`.azdo-mcp.toml` or `$AZDO_MCP_HOME/config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzdoConfig {
    pub org_url: Option<String>,
    pub project: Option<String>,
    /// Team used to resolve the current sprint when a tool call names none.
    pub default_team: Option<String>,
    /// Command line used to invoke the Azure CLI, e.g. `"az"` or `"python -m azure.cli"`.
    ///
    /// A value naming an existing file is taken whole, so `C:\Program Files\...\az.cmd`
    /// needs no quoting. Otherwise it is split with shell quoting rules on Unix and on
    /// whitespace on Windows, where backslashes are path separators.
    pub az_command: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl AzdoConfig {
    /// Layers `other` on top of `self`; set values in `other` win.
    pub fn merge(self, other: AzdoConfig) -> AzdoConfig {
        AzdoConfig {
            org_url: other.org_url.or(self.org_url),
            project: other.project.or(self.project),
            default_team: other.default_team.or(self.default_team),
            az_command: other.az_command.or(self.az_command),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
        }
    }

    /// Reads `AZDO_*` overrides from `env`. Blank values are ignored.
    pub fn from_env(env: &HashMap<String, String>) -> Result<AzdoConfig, ConfigError> {
        let timeout_secs = match env_value(env, ENV_TIMEOUT_SECS) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?),
            None => None,
        };
        Ok(AzdoConfig {
            org_url: env_value(env, ENV_ORG_URL),
            project: env_value(env, ENV_PROJECT),
            default_team: env_value(env, ENV_TEAM),
            az_command: env_value(env, ENV_AZ_COMMAND),
            timeout_secs,
        })
    }
}

fn env_value(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn resolve_user_home_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    env_value(env, "HOME")
        .or_else(|| env_value(env, "USERPROFILE"))
        .map(PathBuf::from)
}

pub fn resolve_azdo_home_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(home) = env_value(env, ENV_HOME) {
        return Some(PathBuf::from(home));
    }
    resolve_user_home_dir(env).map(|home| home.join(".azdo-mcp"))
}

pub fn global_config_path(env: &HashMap<String, String>) -> Option<PathBuf> {
    resolve_azdo_home_dir(env).map(|home| home.join("config.toml"))
}

/// Nearest ancestor of `start` (inclusive) holding a project config file.
pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|candidate| candidate.join(PROJECT_CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}

pub fn load_config_file(path: &Path) -> Result<AzdoConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str::<AzdoConfig>(&text)?)
}

fn load_if_present(path: Option<PathBuf>) -> Result<AzdoConfig, ConfigError> {
    match path {
        Some(path) if path.is_file() => load_config_file(&path),
        _ => Ok(AzdoConfig::default()),
    }
}

/// Loads the effective file configuration.
///
/// An explicit path replaces file discovery; otherwise the project file found from `cwd`
/// is layered over the global file. Environment overrides are applied last.
pub fn load_config(
    explicit: Option<&Path>,
    cwd: &Path,
    env: &HashMap<String, String>,
) -> Result<AzdoConfig, ConfigError> {
    let files = match explicit {
        Some(path) => load_config_file(path)?,
        None => {
            let global = load_if_present(global_config_path(env))?;
            let project =
                load_if_present(find_config_root(cwd).map(|root| root.join(PROJECT_CONFIG_FILE)))?;
            global.merge(project)
        }
    };
    Ok(files.merge(AzdoConfig::from_env(env)?))
}

/// Settings resolved once at start-up and shared read-only by every tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub org_url: Option<String>,
    pub project: Option<String>,
    pub default_team: Option<String>,
    pub az_command: Vec<String>,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            org_url: None,
            project: None,
            default_team: None,
            az_command: vec![DEFAULT_AZ_COMMAND.to_string()],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn from_config(config: AzdoConfig) -> Result<Settings, ConfigError> {
        let az_command = match config.az_command.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => split_command(raw)?,
            _ => vec![DEFAULT_AZ_COMMAND.to_string()],
        };
        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1);
        Ok(Settings {
            org_url: trimmed(config.org_url),
            project: trimmed(config.project),
            default_team: trimmed(config.default_team),
            az_command,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Explicit organisation/project win over configured defaults.
    pub fn scope(&self, org_url: Option<&str>, project: Option<&str>) -> AzScope {
        let explicit = AzScope::new(org_url, project);
        AzScope {
            org_url: explicit.org_url.or_else(|| self.org_url.clone()),
            project: explicit.project.or_else(|| self.project.clone()),
        }
    }

    /// Team for sprint resolution: explicit, then configured default, then none.
    pub fn team(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|team| !team.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_team.clone())
    }
}

fn split_command(raw: &str) -> Result<Vec<String>, ConfigError> {
    if Path::new(raw).is_file() {
        return Ok(vec![raw.to_string()]);
    }
    let parts = if cfg!(windows) {
        raw.split_whitespace().map(str::to_string).collect()
    } else {
        shell_words::split(raw).map_err(|_| ConfigError::InvalidCommand(raw.to_string()))?
    };
    if parts.is_empty() {
        return Err(ConfigError::InvalidCommand(raw.to_string()));
    }
    Ok(parts)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
