use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use dapc_client::events::{ExitedEventBody, OutputEventBody, StoppedEventBody};
use dapc_client::{
    AttachRequestArguments, ClientBreakpoint, ClientEvent, DapError, DebugEvent, DebugSession,
    LaunchRequestArguments, PendingRequest, Request, RunInTerminalRequestArguments,
    RunInTerminalResponseBody, SessionOptions, StackFrame, Variable,
};
use dapc_config::Config;

use crate::cli::{initialize_arguments, AdapterTarget, Cli};

/// Variables printed per stop.
const MAX_VARIABLES: usize = 20;

/// Whether the trace loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Drives one debug run and prints what happens.
struct Tracer {
    session: DebugSession,
    frames: i64,
    exit_code: Option<i64>,
    terminals: Vec<Child>,
}

/// Run a debug session as described by `cli`. Returns the debuggee's exit
/// code, or 0 if the adapter never reported one.
pub async fn run(cli: &Cli, config: &Config) -> Result<i32> {
    let adapter = cli.resolve_adapter(config)?;
    let init = initialize_arguments(&config.session, &adapter.adapter_id);
    let options = SessionOptions {
        request_timeout: Duration::from_secs(config.session.request_timeout_secs),
        event_capacity: config.session.event_capacity,
        ..SessionOptions::default()
    };

    let mut session = match &adapter.target {
        AdapterTarget::Spawn(command) => DebugSession::spawn(command, init, options)
            .with_context(|| format!("failed to start adapter '{}'", command.command))?,
        AdapterTarget::Connect(addr) => DebugSession::connect_tcp(addr, init, options)
            .await
            .with_context(|| format!("failed to connect to adapter at {addr}"))?,
    };
    // Subscribe first: `initialized` may follow the handshake immediately.
    let mut events = session.subscribe();

    let capabilities = session
        .initialize()
        .await
        .context("initialize request failed")?;
    info!(adapter = %adapter.adapter_id, ?capabilities, "debug adapter initialized");

    session
        .with_client(|client| {
            for bp in &cli.breakpoints {
                client
                    .breakpoints_mut()
                    .add(ClientBreakpoint::new(absolute(&bp.path), bp.line));
            }
        })
        .await;

    let start = match &cli.program {
        Some(program) => {
            let args = LaunchRequestArguments {
                program: Some(program.clone()),
                args: Some(cli.program_args.clone()),
                cwd: std::env::current_dir()
                    .ok()
                    .map(|d| d.to_string_lossy().into_owned()),
                stop_on_entry: cli.stop_on_entry.then_some(true),
                ..LaunchRequestArguments::default()
            };
            session.launch(args).await?
        }
        None => {
            let args = AttachRequestArguments {
                process_id: cli.pid,
                ..AttachRequestArguments::default()
            };
            session.attach(args).await?
        }
    };
    let start_command = start.command().to_string();

    let mut tracer = Tracer {
        session,
        frames: cli.frames.max(1),
        exit_code: None,
        terminals: Vec::new(),
    };
    let traced = tracer.trace(&mut events, start, &start_command).await;

    tracer.reap_terminals().await;
    if let Err(e) = tracer.session.shutdown().await {
        warn!(error = %e, "session shutdown failed");
    }
    traced?;

    Ok(tracer.exit_code.map_or(0, exit_status))
}

/// Map a debuggee exit code to our own exit status. Codes outside 0..=255
/// cannot be reported faithfully, so they become a plain failure.
fn exit_status(code: i64) -> i32 {
    u8::try_from(code).map_or(1, i32::from)
}

impl Tracer {
    async fn trace(
        &mut self,
        events: &mut broadcast::Receiver<ClientEvent>,
        start: PendingRequest,
        start_command: &str,
    ) -> Result<()> {
        // Adapters may hold the launch/attach reply until configurationDone,
        // so it is awaited alongside the event stream.
        let start = start.wait();
        tokio::pin!(start);
        let mut start_pending = true;

        loop {
            tokio::select! {
                result = &mut start, if start_pending => {
                    start_pending = false;
                    result.with_context(|| format!("{start_command} request failed"))?;
                    debug!(command = start_command, "debuggee started");
                }
                received = events.recv() => match received {
                    Ok(ClientEvent::Event(event)) => {
                        if self.handle_event(event).await? == Flow::Stop {
                            return Ok(());
                        }
                    }
                    Ok(ClientEvent::ReverseRequest(request)) => {
                        self.handle_reverse_request(request).await?;
                    }
                    Ok(ClientEvent::ProtocolError(message)) => {
                        warn!(%message, "protocol error from adapter");
                    }
                    Ok(ClientEvent::ConnectionClosed) | Err(RecvError::Closed) => {
                        info!("adapter connection closed");
                        return Ok(());
                    }
                    Ok(other) => debug!(?other, "unclaimed message"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "trace loop fell behind; events dropped");
                    }
                },
            }
        }
    }

    async fn handle_event(&mut self, event: DebugEvent) -> Result<Flow> {
        match event {
            DebugEvent::Initialized => {
                self.configure().await?;
            }
            DebugEvent::Output(body) => print_output(&body),
            DebugEvent::Stopped(body) => {
                self.report_stop(&body).await?;
            }
            DebugEvent::Exited(ExitedEventBody { exit_code }) => {
                println!("[dapc] debuggee exited with code {exit_code}");
                self.exit_code = Some(exit_code);
                return Ok(Flow::Stop);
            }
            DebugEvent::Terminated(_) => {
                println!("[dapc] debug session terminated");
                return Ok(Flow::Stop);
            }
            DebugEvent::Breakpoint(body) => {
                debug!(reason = %body.reason, id = ?body.breakpoint.id, verified = body.breakpoint.verified, "breakpoint changed");
            }
            other => debug!(event = other.name(), "event"),
        }
        Ok(Flow::Continue)
    }

    /// Send breakpoints and exception filters, then `configurationDone`.
    async fn configure(&mut self) -> Result<()> {
        let files: Vec<_> = self
            .session
            .with_client(|c| c.breakpoints().files().map(Path::to_path_buf).collect())
            .await;
        for file in files {
            let reported = self
                .session
                .sync_breakpoints(&file)
                .await
                .with_context(|| format!("setting breakpoints in {}", file.display()))?;
            for bp in reported {
                let line = bp.line.map_or_else(|| "?".to_string(), |l| l.to_string());
                if bp.verified {
                    println!("[dapc] breakpoint set at {}:{line}", file.display());
                } else {
                    let why = bp.message.unwrap_or_else(|| "not verified".to_string());
                    println!("[dapc] breakpoint at {}:{line} pending: {why}", file.display());
                }
            }
        }

        let filters = self
            .session
            .with_client(|c| c.dap_capabilities().default_exception_filters())
            .await;
        if !filters.is_empty() {
            self.session
                .request(|c| c.set_exception_breakpoints(filters))
                .await?
                .wait()
                .await
                .context("setExceptionBreakpoints failed")?;
        }

        self.session
            .configuration_done()
            .await
            .context("configurationDone failed")?;
        Ok(())
    }

    /// Print where the debuggee stopped, then resume it.
    async fn report_stop(&mut self, body: &StoppedEventBody) -> Result<()> {
        let thread_id = match body.thread_id {
            Some(id) => id,
            None => match self.session.threads().await?.first() {
                Some(thread) => thread.id,
                None => {
                    warn!("stopped without any threads");
                    return Ok(());
                }
            },
        };

        let mut headline = format!("[dapc] stopped ({}) in thread {thread_id}", body.reason);
        if let Some(text) = body.description.as_ref().or(body.text.as_ref()) {
            headline.push_str(&format!(": {text}"));
        }
        println!("{headline}");

        let trace = self
            .session
            .stack_trace(thread_id, Some(self.frames))
            .await?;
        for (index, frame) in trace.stack_frames.iter().enumerate() {
            println!("  #{index} {}", format_frame(frame));
        }

        if let Some(top) = trace.stack_frames.first() {
            match self.locals(top.id).await {
                Ok(vars) => {
                    for var in vars.iter().take(MAX_VARIABLES) {
                        println!("      {}", format_variable(var));
                    }
                    if vars.len() > MAX_VARIABLES {
                        println!("      ... {} more", vars.len() - MAX_VARIABLES);
                    }
                }
                Err(e) => warn!(error = %e, "could not read locals"),
            }
        }

        match self.session.continue_execution(thread_id).await {
            Ok(_) => Ok(()),
            // The debuggee may have finished while we were looking at it.
            Err(DapError::Rejected { message, .. }) => {
                debug!(%message, "continue rejected");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Variables of the first inexpensive scope of `frame_id`.
    async fn locals(&self, frame_id: i64) -> Result<Vec<Variable>, DapError> {
        let scopes = self.session.scopes(frame_id).await?;
        match scopes.iter().find(|s| !s.expensive) {
            Some(scope) => self.session.variables(scope.variables_reference).await,
            None => Ok(Vec::new()),
        }
    }

    async fn handle_reverse_request(&mut self, request: Request) -> Result<()> {
        match request.command.as_str() {
            "runInTerminal" => {
                let outcome = match request.arguments_as::<RunInTerminalRequestArguments>() {
                    Ok(args) => self.run_in_terminal(&args),
                    Err(e) => Err(e.into()),
                };
                match outcome {
                    Ok(body) => {
                        self.session
                            .respond(
                                request.seq,
                                &request.command,
                                true,
                                Some(serde_json::to_value(body)?),
                                None,
                            )
                            .await?
                    }
                    Err(e) => {
                        warn!(error = %e, "runInTerminal failed");
                        self.session
                            .respond(request.seq, &request.command, false, None, Some(e.to_string()))
                            .await?
                    }
                }
            }
            other => {
                debug!(command = other, "unsupported reverse request");
                self.session
                    .respond(
                        request.seq,
                        &request.command,
                        false,
                        None,
                        Some(format!("{other} is not supported")),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Start the debuggee ourselves, sharing dapc's terminal.
    fn run_in_terminal(&mut self, args: &RunInTerminalRequestArguments) -> Result<RunInTerminalResponseBody> {
        let (program, rest) = args
            .args
            .split_first()
            .context("runInTerminal without a command")?;
        let mut cmd = TokioCommand::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if !args.cwd.is_empty() {
            cmd.current_dir(&args.cwd);
        }
        for (key, value) in args.env.iter().flatten() {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to run {program}"))?;
        let process_id = child.id().map(i64::from);
        info!(program = %program, ?process_id, "started debuggee for runInTerminal");
        self.terminals.push(child);
        Ok(RunInTerminalResponseBody {
            process_id,
            shell_process_id: None,
        })
    }

    async fn reap_terminals(&mut self) {
        for mut child in self.terminals.drain(..) {
            match child.try_wait() {
                Ok(Some(status)) => debug!(%status, "runInTerminal process finished"),
                Ok(None) => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to stop runInTerminal process");
                    }
                }
                Err(e) => warn!(error = %e, "failed to check runInTerminal process"),
            }
        }
    }
}

fn print_output(body: &OutputEventBody) {
    match body.category.as_deref() {
        Some("telemetry") => {}
        Some("stderr") => eprint!("{}", body.output),
        _ => print!("{}", body.output),
    }
}

fn absolute(path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// `name at file:line:column`, using the source path when there is one.
pub fn format_frame(frame: &StackFrame) -> String {
    let location = frame
        .source
        .as_ref()
        .and_then(|s| s.path.clone().or_else(|| s.name.clone()));
    match location {
        Some(file) => format!("{} at {file}:{}:{}", frame.name, frame.line, frame.column),
        None => format!("{} at <unknown>:{}", frame.name, frame.line),
    }
}

/// `name: type = value`, or `name = value` without a type.
pub fn format_variable(var: &Variable) -> String {
    match var.variable_type.as_deref() {
        Some(ty) if !ty.is_empty() => format!("{}: {ty} = {}", var.name, var.value),
        _ => format!("{} = {}", var.name, var.value),
    }
}
