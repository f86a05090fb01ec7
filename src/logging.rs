//! Logging for the bridge
//!
//! Built on `tracing`. Boundary code logs under three targets:
//! `ffi` (handle acquire/release, ledger), `interop` (resolve, marshal,
//! invoke) and `runtime` (sessions, `sys.path`, preloading). Handle
//! traffic is at `trace` level, so it costs nothing unless asked for.

use crate::config::LoggingConfig;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use crate::config::LogFormatConfig as LogFormat;

/// Targets the boundary modules log under
pub const BOUNDARY_TARGETS: [&str; 3] = ["ffi", "interop", "runtime"];

const FILE_PREFIX: &str = "pybridge.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// `pybridge.log.<date>` files in this directory, rotated daily
    Daily(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Level for `BOUNDARY_TARGETS`, when it should differ from `level`
    pub boundary: Option<Level>,
    /// Show each `invoke` span opening and closing
    pub span_events: bool,
    /// Extra `EnvFilter` directives, comma separated
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            boundary: None,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Trace handle traffic without raising the level everywhere else.
    pub fn with_boundary_level(mut self, level: Level) -> Self {
        self.boundary = Some(level);
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directives in the order they are applied
    pub fn directives(&self) -> Vec<String> {
        let mut directives = vec![self.level.to_string().to_lowercase()];
        if let Some(level) = self.boundary {
            let level = level.to_string().to_lowercase();
            directives.extend(BOUNDARY_TARGETS.iter().map(|target| format!("{}={}", target, level)));
        }
        if let Some(filter) = &self.filter {
            directives.extend(
                filter
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from),
            );
        }
        directives
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: Level::from_str(&config.level).unwrap_or(Level::INFO),
            format: config.format,
            output: config
                .directory
                .as_ref()
                .map_or(LogOutput::Stderr, |dir| LogOutput::Daily(PathBuf::from(dir))),
            boundary: config.boundary.as_deref().and_then(|l| Level::from_str(l).ok()),
            span_events: false,
            filter: None,
        }
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit or buffered lines are lost.
/// Returns `None` when a subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::Daily(directory) => tracing_appender::non_blocking(rolling::daily(directory, FILE_PREFIX)),
    };

    let layer = fmt::layer().with_writer(writer).with_span_events(span_events);
    let layer = match config.format {
        LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init().ok().map(|()| guard)
}

/// `RUST_LOG` first, then the configured directives on top.
fn build_filter(config: &LogConfig) -> EnvFilter {
    config
        .directives()
        .iter()
        .fold(EnvFilter::from_default_env(), |filter, directive| match directive.parse() {
            Ok(parsed) => filter.add_directive(parsed),
            Err(_) => {
                eprintln!("ignoring invalid log directive {:?}", directive);
                filter
            }
        })
}

/// Debug output on stderr with boundary spans visible
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_level(Level::DEBUG)
            .with_boundary_level(Level::DEBUG)
            .with_span_events(true),
    )
}

/// JSON lines into daily files under `log_dir`
pub fn init_prod_logging(log_dir: impl Into<PathBuf>) -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_format(LogFormat::Json)
            .with_output(LogOutput::Daily(log_dir.into()))
            .with_boundary_level(Level::WARN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_level_expands_to_targets() {
        let config = LogConfig::new()
            .with_level(Level::WARN)
            .with_boundary_level(Level::TRACE)
            .with_filter("pybridge=debug, ,hyper=off");

        assert_eq!(
            config.directives(),
            vec!["warn", "ffi=trace", "interop=trace", "runtime=trace", "pybridge=debug", "hyper=off"]
        );
    }

    #[test]
    fn test_from_file_config() {
        let file_config = LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            directory: Some("/var/log/pybridge".to_string()),
            boundary: Some("trace".to_string()),
        };
        let config = LogConfig::from(&file_config);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.output, LogOutput::Daily(PathBuf::from("/var/log/pybridge")));
        assert_eq!(config.boundary, Some(Level::TRACE));
    }

    #[test]
    fn test_unknown_levels_fall_back() {
        let file_config = LoggingConfig {
            level: "loud".to_string(),
            boundary: Some("louder".to_string()),
            ..LoggingConfig::default()
        };
        let config = LogConfig::from(&file_config);

        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.boundary, None);
        assert_eq!(config.directives(), vec!["info"]);
    }
}
