//! Configuration loading and resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MEP_*`)
//! 3. TOML config file (`~/.config/mep/config.toml`, then `/etc/mep/config.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file is not fatal: a warning is logged and
//! the remaining tiers apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::enrich::RuleTable;
use crate::{Error, Result};

pub const ENV_ROOT_FOLDER: &str = "MEP_ROOT_FOLDER";
pub const ENV_BIND: &str = "MEP_BIND";
pub const ENV_PORT: &str = "MEP_PORT";
pub const ENV_WINDOW_SECS: &str = "MEP_WINDOW_SECS";
pub const ENV_ENRICHMENT_ENABLED: &str = "MEP_ENRICHMENT_ENABLED";
pub const ENV_RULES_FILE: &str = "MEP_RULES_FILE";
pub const ENV_EVENT_BUS_CAPACITY: &str = "MEP_EVENT_BUS_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "MEP_LOG_LEVEL";

pub const MAX_WINDOW_SECS: i64 = 86_400;
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Folder holding the warehouse database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Aggregation bucket width in seconds
    #[serde(default)]
    pub window_secs: Option<i64>,
    #[serde(default)]
    pub enrichment_enabled: Option<bool>,
    /// Custom enrichment rule table (TOML)
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    #[serde(default)]
    pub event_bus_capacity: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse config failed: {}", e)))
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default)]
    pub level: Option<String>,
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub window_secs: i64,
    pub enrichment_enabled: bool,
    pub event_bus_capacity: usize,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind: "127.0.0.1".to_string(),
            port: 5810,
            window_secs: 60,
            enrichment_enabled: true,
            event_bus_capacity: 1000,
            log_level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub window_secs: Option<i64>,
    pub enrichment_enabled: Option<bool>,
    pub rules_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub window_secs: i64,
    pub enrichment_enabled: bool,
    pub rules_file: Option<PathBuf>,
    pub event_bus_capacity: usize,
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let d = CompiledDefaults::for_current_platform();
        Self {
            root_folder: d.root_folder,
            bind: d.bind,
            port: d.port,
            window_secs: d.window_secs,
            enrichment_enabled: d.enrichment_enabled,
            rules_file: None,
            event_bus_capacity: d.event_bus_capacity,
            log_level: d.log_level,
        }
    }
}

impl PipelineConfig {
    /// Resolve CLI > ENV > TOML > compiled default, then validate
    pub fn resolve(cli: &CliOverrides, toml: Option<&TomlConfig>) -> Result<Self> {
        let d = CompiledDefaults::for_current_platform();
        let empty = TomlConfig::default();
        let toml = toml.unwrap_or(&empty);

        let config = Self {
            root_folder: pick(
                cli.root_folder.clone(),
                env_parsed(ENV_ROOT_FOLDER)?,
                toml.root_folder.clone(),
                d.root_folder,
            ),
            bind: pick(cli.bind.clone(), env_parsed(ENV_BIND)?, toml.bind.clone(), d.bind),
            port: pick(cli.port, env_parsed(ENV_PORT)?, toml.port, d.port),
            window_secs: pick(cli.window_secs, env_parsed(ENV_WINDOW_SECS)?, toml.window_secs, d.window_secs),
            enrichment_enabled: pick(
                cli.enrichment_enabled,
                env_parsed(ENV_ENRICHMENT_ENABLED)?,
                toml.enrichment_enabled,
                d.enrichment_enabled,
            ),
            rules_file: cli
                .rules_file
                .clone()
                .or(env_parsed(ENV_RULES_FILE)?)
                .or_else(|| toml.rules_file.clone()),
            event_bus_capacity: pick(
                None,
                env_parsed(ENV_EVENT_BUS_CAPACITY)?,
                toml.event_bus_capacity,
                d.event_bus_capacity,
            ),
            log_level: pick(
                cli.log_level.clone(),
                env_parsed(ENV_LOG_LEVEL)?,
                toml.logging.level.clone(),
                d.log_level,
            )
            .to_ascii_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_SECS).contains(&self.window_secs) {
            return Err(Error::Config(format!(
                "window_secs must be between 1 and {}, got {}",
                MAX_WINDOW_SECS, self.window_secs
            )));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be at least 1".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Error::Config(format!(
                "unknown log level `{}` (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Warehouse database file inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("mep.db")
    }

    /// Configured rule table, or the built-in one
    pub fn rule_table(&self) -> Result<RuleTable> {
        match &self.rules_file {
            Some(path) => {
                info!("Loading enrichment rules from {}", path.display());
                RuleTable::load(path)
            }
            None => Ok(RuleTable::builtin()),
        }
    }
}

fn pick<T>(cli: Option<T>, env: Option<T>, toml: Option<T>, default: T) -> T {
    cli.or(env).or(toml).unwrap_or(default)
}

/// Read and parse an environment variable; unset or empty means `None`
fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value `{}`", name, value))),
        Err(_) => Ok(None),
    }
}

/// Locate the platform config file, if one exists
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mep").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/mep/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Load the TOML config
///
/// With an explicit `path` a missing or malformed file is an error. Without
/// one, the platform locations are searched and problems only warn.
pub fn load_toml_config(path: Option<&Path>) -> Result<Option<TomlConfig>> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
        return TomlConfig::from_toml_str(&content).map(Some);
    }

    let Some(path) = config_file_path() else {
        info!("No config file found, using environment and compiled defaults");
        return Ok(None);
    };
    match std::fs::read_to_string(&path)
        .map_err(Error::from)
        .and_then(|content| TomlConfig::from_toml_str(&content))
    {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            Ok(Some(config))
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/mep
        dirs::data_local_dir()
            .map(|d| d.join("mep"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mep"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mep"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mep"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mep"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mep"))
    } else {
        PathBuf::from("./mep_data")
    }
}
