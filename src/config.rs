use crate::error::{OpnError, Result};
use crate::index;
use crate::model::StartMode;
use chrono::Duration;
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const START_MODE_ENV: &str = "OPN_START_MODE";
pub const TERMINAL_ENV_VARS: [&str; 2] = ["OPN_TERM_CMD", "TERMINAL_COMMAND"];
pub const CURRENT_DESKTOP_ENV: &str = "XDG_CURRENT_DESKTOP";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    /// Used when none of the terminal environment variables is set.
    #[serde(default)]
    pub terminal: Option<String>,
    /// Same syntax as OPN_START_MODE, which takes precedence.
    #[serde(default)]
    pub start_mode: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_ttl_hours() -> i64 { 24 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let Some(dirs) = ProjectDirs::from("org", "opn", "opn") else {
        return Ok(Config::default());
    };
    let config_path = dirs.config_dir().join("config.toml");

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)?;
    toml::from_str(&content).map_err(|e| {
        OpnError::config(
            format!("Invalid configuration file {:?}: {}", config_path, e),
            "Fix or remove the file",
        )
    })
}

/// Where programs start when the user did not pick a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartModeDefaults {
    pub gui: StartMode,
    pub term: StartMode,
}

impl Default for StartModeDefaults {
    fn default() -> Self {
        Self {
            gui: StartMode::Detached,
            term: StartMode::Attached,
        }
    }
}

impl StartModeDefaults {
    /// Parses `target:mode` pairs such as `gui:d,term:a`. Targets that are
    /// not mentioned keep their built-in default.
    pub fn parse(value: &str) -> Result<Self> {
        let hint = "Use comma separated target:mode pairs, e.g. OPN_START_MODE=\"gui:d,term:a\"";
        let mut defaults = Self::default();

        for pair in value.split(',') {
            if pair.is_empty() {
                continue;
            }

            let parts: Vec<&str> = pair.split(':').collect();
            let [target, mode] = parts.as_slice() else {
                return Err(OpnError::config(
                    format!(
                        "Invalid value of {START_MODE_ENV}: '{value}'. \
                         The target conf must contain a single colon"
                    ),
                    hint,
                ));
            };

            let slot = match *target {
                "gui" => &mut defaults.gui,
                "term" => &mut defaults.term,
                other => {
                    return Err(OpnError::config(
                        format!(
                            "Unknown target in {START_MODE_ENV}: '{other}'. \
                             Either 'gui' or 'term' expected"
                        ),
                        hint,
                    ));
                }
            };

            *slot = StartMode::from_letter(mode).ok_or_else(|| {
                OpnError::config(
                    format!(
                        "Unknown start mode in {START_MODE_ENV} for {target}: '{mode}'. \
                         Either 'a' or 'd' expected"
                    ),
                    hint,
                )
            })?;
        }

        Ok(defaults)
    }

    /// Interactive override, then the configured default for the kind of
    /// program.
    pub fn resolve(&self, chosen: Option<StartMode>, needs_terminal: bool) -> StartMode {
        chosen.unwrap_or(if needs_terminal { self.term } else { self.gui })
    }
}

/// The raw terminal command and where it came from. It is only split into
/// words when a program actually needs a new terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSetting {
    pub source: String,
    pub value: String,
}

impl TerminalSetting {
    pub fn argv(&self) -> Result<Vec<String>> {
        match shlex::split(&self.value) {
            Some(words) if !words.is_empty() => Ok(words),
            _ => Err(OpnError::config(
                format!("Failed to parse {}={}", self.source, self.value),
                "Use a shell-quoted command, e.g. \"gnome-terminal --\"",
            )),
        }
    }
}

/// Effective settings after merging environment and config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub start_modes: StartModeDefaults,
    pub terminal: Option<TerminalSetting>,
    pub cache_path: PathBuf,
    pub cache_ttl: Duration,
    pub current_desktop: String,
}

impl Settings {
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::resolve(config, |key| env::var(key).ok())
    }

    pub fn resolve(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let start_modes = match lookup(START_MODE_ENV).or_else(|| config.general.start_mode.clone()) {
            Some(value) => StartModeDefaults::parse(&value)?,
            None => StartModeDefaults::default(),
        };

        let terminal = TERMINAL_ENV_VARS
            .iter()
            .find_map(|var| {
                lookup(var)
                    .filter(|v| !v.is_empty())
                    .map(|value| TerminalSetting {
                        source: var.to_string(),
                        value,
                    })
            })
            .or_else(|| {
                config
                    .general
                    .terminal
                    .clone()
                    .filter(|v| !v.is_empty())
                    .map(|value| TerminalSetting {
                        source: "general.terminal".to_string(),
                        value,
                    })
            });

        let cache_ttl = if config.cache.ttl_hours > 0 {
            Duration::try_hours(config.cache.ttl_hours).ok_or_else(|| {
                OpnError::config(
                    format!("cache.ttl_hours is out of range: {}", config.cache.ttl_hours),
                    "Use a number of hours below 2562047788015",
                )
            })?
        } else {
            index::default_ttl()
        };

        Ok(Self {
            start_modes,
            terminal,
            cache_path: index::cache_path(config.cache.path.as_deref())?,
            cache_ttl,
            current_desktop: lookup(CURRENT_DESKTOP_ENV).unwrap_or_default(),
        })
    }
}
