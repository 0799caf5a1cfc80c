use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use storage_memory::MemoryStorageFactory;
use tester_api::StorageFactory;

use crate::error::EngineError;

/// Root configuration of a Tester. Parsed from TOML or taken from the
/// environment; every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TesterConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the engine's own tracing output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    /// Drop everything.
    #[default]
    Discard,
    /// Use whatever subscriber is current when the Tester is created.
    Inherit,
    Stdout,
    Stderr,
    /// Print through the test harness so output is captured per test.
    Test,
}

impl FromStr for LogSink {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(LogSink::Discard),
            "inherit" => Ok(LogSink::Inherit),
            "stdout" => Ok(LogSink::Stdout),
            "stderr" => Ok(LogSink::Stderr),
            "test" => Ok(LogSink::Test),
            other => Err(EngineError::Config(format!("unknown log sink: '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `"debug"` or `"tester_engine=trace"`.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub sink: LogSink,
}

fn default_filter() -> String {
    "debug".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            sink: LogSink::default(),
        }
    }
}

impl LogConfig {
    /// Build the dispatcher every engine future and consumer task runs under.
    /// Never touches the global default subscriber.
    pub fn dispatch(&self) -> Result<Dispatch, EngineError> {
        let filter = || {
            EnvFilter::try_new(&self.filter)
                .map_err(|e| EngineError::Config(format!("log filter '{}': {e}", self.filter)))
        };
        let builder = tracing_subscriber::fmt().with_target(false);
        Ok(match self.sink {
            LogSink::Discard => Dispatch::none(),
            LogSink::Inherit => tracing::dispatcher::get_default(|d| d.clone()),
            LogSink::Stdout => {
                Dispatch::new(builder.with_env_filter(filter()?).with_writer(std::io::stdout).finish())
            }
            LogSink::Stderr => {
                Dispatch::new(builder.with_env_filter(filter()?).with_writer(std::io::stderr).finish())
            }
            LogSink::Test => Dispatch::new(builder.with_env_filter(filter()?).with_test_writer().finish()),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage backend for table replicas. Built-in: `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Backend-specific config, forwarded to the factory as JSON.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_backend() -> String {
    "memory".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            config: serde_json::Value::Null,
        }
    }
}

impl StorageConfig {
    pub fn factory(&self) -> Result<Arc<dyn StorageFactory>, EngineError> {
        match self.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryStorageFactory)),
            other => Err(EngineError::Config(format!("unknown storage backend: '{other}'"))),
        }
    }
}

impl TesterConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Defaults, with logging switched on by `TESTER_LOG` (filter directives)
    /// and `TESTER_LOG_SINK` (defaults to `test` once `TESTER_LOG` is set).
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var("TESTER_LOG") {
            config.log.filter = filter;
            config.log.sink = match std::env::var("TESTER_LOG_SINK") {
                Ok(sink) => sink.parse()?,
                Err(_) => LogSink::Test,
            };
        }
        Ok(config)
    }
}
