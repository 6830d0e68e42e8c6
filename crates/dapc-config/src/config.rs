use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose; includes every frame on the wire.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file. Defaults to the platform log directory.
    pub file: Option<PathBuf>,
}

/// How paths are expressed to the adapter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathFormat {
    /// Native file system paths.
    #[default]
    Path,
    /// `file://` URIs.
    Uri,
}

impl PathFormat {
    /// The wire value sent in the `initialize` request.
    pub fn as_str(self) -> &'static str {
        match self {
            PathFormat::Path => "path",
            PathFormat::Uri => "uri",
        }
    }
}

/// Settings applied to every debug session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `clientID` sent in `initialize`.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// `clientName` sent in `initialize`.
    #[serde(default = "default_client_id")]
    pub client_name: String,
    /// Optional locale, e.g. `en-US`.
    #[serde(default)]
    pub locale: Option<String>,
    /// Whether line numbers are 1-based.
    #[serde(default = "default_true")]
    pub lines_start_at1: bool,
    /// Whether column numbers are 1-based.
    #[serde(default = "default_true")]
    pub columns_start_at1: bool,
    /// Path format announced to the adapter.
    #[serde(default)]
    pub path_format: PathFormat,
    /// Seconds to wait for a response before giving up (1–600).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_client_id() -> String {
    "dapc".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_name: default_client_id(),
            locale: None,
            lines_start_at1: true,
            columns_start_at1: true,
            path_format: PathFormat::Path,
            request_timeout_secs: default_request_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// How dapc reaches an adapter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterTransport {
    /// Spawn `command` and talk over its stdin/stdout.
    #[default]
    Stdio,
    /// Connect to an adapter already listening on `host:port`.
    Tcp,
}

/// Configuration for a single debug adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEntry {
    /// The command to run the adapter (stdio transport).
    #[serde(default)]
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// `adapterID` sent in `initialize`. Defaults to the table key.
    #[serde(default)]
    pub adapter_id: Option<String>,
    /// Working directory of the adapter process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Transport used to reach the adapter.
    #[serde(default)]
    pub transport: AdapterTransport,
    /// Host for the tcp transport.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port for the tcp transport.
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Top-level dapc configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Session defaults.
    #[serde(default)]
    pub session: SessionConfig,
    /// Known adapters, keyed by name.
    #[serde(default)]
    pub adapters: HashMap<String, AdapterEntry>,
}

impl Config {
    /// Look up an adapter by name.
    pub fn adapter(&self, name: &str) -> Option<&AdapterEntry> {
        self.adapters.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
        assert_eq!(cfg.session.client_id, "dapc");
        assert_eq!(cfg.session.client_name, "dapc");
        assert!(cfg.session.locale.is_none());
        assert!(cfg.session.lines_start_at1);
        assert!(cfg.session.columns_start_at1);
        assert_eq!(cfg.session.path_format, PathFormat::Path);
        assert_eq!(cfg.session.request_timeout_secs, 10);
        assert_eq!(cfg.session.event_capacity, 256);
        assert!(cfg.adapters.is_empty());
    }

    #[test]
    fn parse_adapter_table() {
        let input = r#"
[adapters.debugpy]
command = "python"
args = ["-m", "debugpy.adapter"]

[adapters.remote]
transport = "tcp"
port = 4711
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        let py = cfg.adapter("debugpy").unwrap();
        assert_eq!(py.command, "python");
        assert_eq!(py.args, vec!["-m", "debugpy.adapter"]);
        assert_eq!(py.transport, AdapterTransport::Stdio);
        assert!(py.adapter_id.is_none());

        let remote = cfg.adapter("remote").unwrap();
        assert_eq!(remote.transport, AdapterTransport::Tcp);
        assert_eq!(remote.host, "127.0.0.1");
        assert_eq!(remote.port, Some(4711));
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut adapters = HashMap::new();
        adapters.insert(
            "lldb".to_string(),
            AdapterEntry {
                command: "lldb-dap".into(),
                args: vec![],
                adapter_id: Some("lldb-dap".into()),
                cwd: Some(PathBuf::from("/tmp")),
                transport: AdapterTransport::Stdio,
                host: default_host(),
                port: None,
            },
        );
        let cfg = Config {
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/dapc.log")),
            },
            session: SessionConfig {
                locale: Some("en-US".into()),
                path_format: PathFormat::Uri,
                request_timeout_secs: 30,
                ..SessionConfig::default()
            },
            adapters,
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn enum_wire_names() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(PathFormat::Uri.as_str(), "uri");
    }
}
