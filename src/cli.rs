use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Parser;

use dapc_client::{AdapterCommand, InitializeRequestArguments};
use dapc_config::{AdapterTransport, Config, SessionConfig};

/// Launch or attach to a program under a debug adapter and trace the run.
///
/// The adapter is taken from `--connect`, `--command`, or a named
/// `[adapters.<name>]` entry of the configuration, in that order.
#[derive(Parser, Debug)]
#[command(name = "dapc", version, about = "Debug Adapter Protocol client")]
pub struct Cli {
    /// Configuration directory (default: ~/.config/dapc).
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Adapter to use, by name from the configuration.
    #[arg(long, value_name = "NAME")]
    pub adapter: Option<String>,

    /// Adapter executable to spawn; its arguments follow `--`.
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,

    /// Connect to an adapter listening on HOST:PORT.
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "command")]
    pub connect: Option<String>,

    /// Program to launch. Without it dapc attaches.
    #[arg(long, value_name = "PATH")]
    pub program: Option<String>,

    /// Argument passed to the program (repeatable).
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub program_args: Vec<String>,

    /// Process to attach to when no program is given.
    #[arg(long, value_name = "PID")]
    pub pid: Option<i64>,

    /// Breakpoint location (repeatable).
    #[arg(long = "break", value_name = "FILE:LINE", value_parser = parse_breakpoint)]
    pub breakpoints: Vec<BreakpointSpec>,

    /// Ask the adapter to stop at the program entry.
    #[arg(long)]
    pub stop_on_entry: bool,

    /// Number of stack frames printed on each stop.
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub frames: i64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Arguments for the adapter given with `--command`.
    #[arg(last = true, value_name = "ADAPTER_ARGS")]
    pub adapter_args: Vec<String>,
}

/// A `--break FILE:LINE` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub path: PathBuf,
    pub line: i64,
}

/// Parse `FILE:LINE`. The last colon separates the line, so Windows drive
/// letters survive.
pub fn parse_breakpoint(value: &str) -> Result<BreakpointSpec, String> {
    let (file, line) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got '{value}'"))?;
    if file.is_empty() {
        return Err(format!("missing file in '{value}'"));
    }
    let line: i64 = line
        .parse()
        .map_err(|_| format!("invalid line number '{line}'"))?;
    if line < 1 {
        return Err(format!("line numbers start at 1, got {line}"));
    }
    Ok(BreakpointSpec {
        path: PathBuf::from(file),
        line,
    })
}

/// Where the adapter lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterTarget {
    Spawn(AdapterCommand),
    Connect(String),
}

/// A resolved adapter plus the `adapterID` to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAdapter {
    pub target: AdapterTarget,
    pub adapter_id: String,
}

impl Cli {
    /// Work out which adapter to talk to.
    pub fn resolve_adapter(&self, config: &Config) -> Result<ResolvedAdapter> {
        let entry = match &self.adapter {
            Some(name) => Some(
                config
                    .adapter(name)
                    .ok_or_else(|| anyhow!("unknown adapter '{name}'"))?,
            ),
            None => None,
        };
        let adapter_id = entry
            .and_then(|e| e.adapter_id.clone())
            .or_else(|| self.adapter.clone());

        if let Some(addr) = &self.connect {
            return Ok(ResolvedAdapter {
                target: AdapterTarget::Connect(addr.clone()),
                adapter_id: adapter_id.unwrap_or_else(|| "dapc".to_string()),
            });
        }

        if let Some(command) = &self.command {
            let fallback = PathBuf::from(command)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| command.clone());
            return Ok(ResolvedAdapter {
                target: AdapterTarget::Spawn(AdapterCommand::new(
                    command.clone(),
                    self.adapter_args.clone(),
                )),
                adapter_id: adapter_id.unwrap_or(fallback),
            });
        }

        let Some(entry) = entry else {
            bail!("no adapter given: use --adapter, --command or --connect");
        };
        let adapter_id = adapter_id.unwrap_or_default();
        let target = match entry.transport {
            AdapterTransport::Stdio => {
                let mut command = AdapterCommand::new(entry.command.clone(), entry.args.clone());
                command.args.extend(self.adapter_args.iter().cloned());
                command.cwd = entry.cwd.clone();
                AdapterTarget::Spawn(command)
            }
            AdapterTransport::Tcp => {
                let port = entry
                    .port
                    .ok_or_else(|| anyhow!("adapter '{adapter_id}' has no port"))?;
                AdapterTarget::Connect(format!("{}:{}", entry.host, port))
            }
        };
        Ok(ResolvedAdapter { target, adapter_id })
    }
}

/// `initialize` arguments for a session with the given settings.
pub fn initialize_arguments(session: &SessionConfig, adapter_id: &str) -> InitializeRequestArguments {
    InitializeRequestArguments {
        client_id: Some(session.client_id.clone()),
        client_name: Some(session.client_name.clone()),
        adapter_id: adapter_id.to_string(),
        locale: session.locale.clone(),
        lines_start_at1: Some(session.lines_start_at1),
        columns_start_at1: Some(session.columns_start_at1),
        path_format: Some(session.path_format.as_str().to_string()),
        supports_variable_type: Some(true),
        supports_run_in_terminal_request: Some(true),
        ..Default::default()
    }
}
