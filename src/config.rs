use crate::interop::SymbolRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAMES: [&str; 2] = [".pybridge.toml", "pybridge.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directories prepended to `sys.path`
    #[serde(default)]
    pub python_path: Vec<String>,

    /// Modules imported once at start-up to move their import cost out
    /// of the first call
    #[serde(default)]
    pub preload: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_module")]
    pub module: String,

    #[serde(default = "default_attribute")]
    pub attribute: String,

    /// Callable taking the JSON `bytearray` form of the batch
    #[serde(default = "default_json_attribute")]
    pub json_attribute: String,

    /// Abandon calls that run longer than this; 0 waits forever
    #[serde(default)]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatConfig,

    /// Write daily-rotated files here instead of stderr
    #[serde(default)]
    pub directory: Option<String>,

    /// Separate level for the boundary targets (`ffi`, `interop`, `runtime`)
    #[serde(default)]
    pub boundary: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatConfig {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python_path: vec!["python".to_string()],
            preload: Vec::new(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            attribute: default_attribute(),
            json_attribute: default_json_attribute(),
            timeout_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatConfig::default(),
            directory: None,
            boundary: None,
        }
    }
}

fn default_module() -> String { "scorer".to_string() }
fn default_attribute() -> String { "select_pod".to_string() }
fn default_json_attribute() -> String { "decode_json_bytes".to_string() }
fn default_level() -> String { "info".to_string() }

impl ScorerConfig {
    pub fn symbol(&self) -> SymbolRef {
        SymbolRef::new(&self.module, &self.attribute)
    }

    pub fn json_symbol(&self) -> SymbolRef {
        SymbolRef::new(&self.module, &self.json_attribute)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load configuration from `start` or any of its parents.
    ///
    /// Falls back to defaults when no file is found. A file that exists
    /// but fails to parse is reported rather than skipped.
    pub fn discover_from(start: &Path) -> Result<Self, ConfigError> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let config_path = dir.join(name);
                if config_path.is_file() {
                    return Self::load(&config_path);
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(Self::default())
    }

    /// Discover configuration starting at the current directory
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
