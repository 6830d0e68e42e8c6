//! Async debug session.
//!
//! [`DebugSession`] drives a [`DapClient`] over a byte stream: a spawned
//! adapter's stdio, a TCP connection, or any `AsyncRead`/`AsyncWrite` pair.
//!
//! One writer task drains an mpsc queue of encoded frames. One reader task
//! feeds incoming bytes to the client and walks the resulting events in wire
//! order: responses wake their waiters through the [`Dispatcher`], anything
//! else goes out on a broadcast channel. Because both happen under the same
//! lock and in order, an event sent before a response is published before
//! that response's waiter is woken.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::client::{ClientEvent, ClientState, DapClient, ResponseEvent};
use crate::dispatcher::{Dispatcher, ResponseOutcome};
use crate::error::DapError;
use crate::events::DebugEvent;
use crate::protocol::{
    AttachRequestArguments, Breakpoint, Capabilities, ContinueResponseBody, DisconnectArguments,
    EvaluateResponseBody, InitializeRequestArguments, LaunchRequestArguments, Scope,
    ScopesResponseBody, SetBreakpointsResponseBody, Source, SourceBreakpoint,
    StackTraceResponseBody, Thread, ThreadsResponseBody, Variable, VariablesResponseBody,
};

/// Default timeout for requests (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const READ_CHUNK_SIZE: usize = 8192;
const WRITER_QUEUE_DEPTH: usize = 64;

/// How to start a debug adapter process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCommand {
    /// Executable to run.
    pub command: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory of the adapter.
    pub cwd: Option<PathBuf>,
}

impl AdapterCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
        }
    }
}

/// Tunables of a [`DebugSession`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long [`PendingRequest::wait`] waits for a response.
    pub request_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// How long [`DebugSession::shutdown`] waits for the adapter to exit
    /// before killing it.
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            event_capacity: 256,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

struct Inner {
    client: DapClient,
    dispatcher: Dispatcher,
}

/// A request that has been sent and may be awaited.
pub struct PendingRequest {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<ResponseOutcome>,
    timeout: Duration,
    inner: Arc<Mutex<Inner>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
}

impl PendingRequest {
    /// Sequence number of the request.
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the response using the session's request timeout.
    pub async fn wait(self) -> Result<ResponseEvent, DapError> {
        let limit = self.timeout;
        self.wait_timeout(limit).await
    }

    /// Wait for the response for at most `limit`.
    ///
    /// On timeout the request is forgotten and, if the adapter supports
    /// it, a `cancel` request is sent for it.
    pub async fn wait_timeout(self, limit: Duration) -> Result<ResponseEvent, DapError> {
        let PendingRequest {
            seq,
            command,
            rx,
            inner,
            writer_tx,
            ..
        } = self;
        match timeout(limit, rx).await {
            Ok(Ok(ResponseOutcome::Success(response))) => Ok(response),
            Ok(Ok(ResponseOutcome::Failure(failure))) => Err(DapError::Rejected {
                message: failure.describe(),
                command: failure.command,
            }),
            Ok(Err(_)) => Err(DapError::ConnectionClosed),
            Err(_) => {
                tracing::warn!(seq, command = %command, ?limit, "request timed out");
                abandon_request(&inner, &writer_tx, seq).await;
                Err(DapError::Timeout { command })
            }
        }
    }

    /// Wait for the response and decode its body.
    pub async fn wait_body<T: DeserializeOwned>(self) -> Result<T, DapError> {
        self.wait().await?.body_as()
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("seq", &self.seq)
            .field("command", &self.command)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Stop waiting for `seq` and ask the adapter to cancel it.
async fn abandon_request(inner: &Mutex<Inner>, writer_tx: &mpsc::Sender<Vec<u8>>, seq: i64) {
    let bytes = {
        let mut guard = inner.lock().await;
        guard.dispatcher.cancel(seq);
        guard.client.forget_request(seq);
        if !guard.client.dap_capabilities().supports_cancel_request {
            return;
        }
        match guard.client.cancel(Some(seq), None) {
            Ok(cancel_seq) => {
                // Nobody awaits the cancel itself; registering it keeps its
                // response from being reported as unknown.
                drop(guard.dispatcher.register(cancel_seq, "cancel"));
                guard.client.send()
            }
            Err(e) => {
                tracing::debug!(seq, error = %e, "cancel not sent");
                return;
            }
        }
    };
    if let Err(e) = write_frames(writer_tx, bytes).await {
        tracing::debug!(seq, error = %e, "could not send cancel");
    }
}

/// Queue `bytes` for the writer task.
///
/// Never call this while holding the `Inner` lock: the queue is bounded and
/// the reader needs the lock to make progress.
async fn write_frames(writer_tx: &mpsc::Sender<Vec<u8>>, bytes: Vec<u8>) -> Result<(), DapError> {
    if bytes.is_empty() {
        return Ok(());
    }
    writer_tx
        .send(bytes)
        .await
        .map_err(|_| DapError::ConnectionClosed)
}

/// An async connection to a debug adapter.
pub struct DebugSession {
    inner: Arc<Mutex<Inner>>,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    events: broadcast::Sender<ClientEvent>,
    handshake: Option<(i64, oneshot::Receiver<ResponseOutcome>)>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    options: SessionOptions,
}

impl DebugSession {
    /// Start a session over an existing byte stream.
    ///
    /// The `initialize` request is queued but not sent until
    /// [`DebugSession::initialize`] is called. Must be called from within a
    /// tokio runtime.
    pub fn from_streams<R, W>(
        reader: R,
        writer: W,
        init: InitializeRequestArguments,
        options: SessionOptions,
    ) -> Result<Self, DapError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let client = DapClient::new(init)?;
        let mut dispatcher = Dispatcher::new();
        let init_seq = client.initialize_seq();
        let handshake_rx = dispatcher.register(init_seq, "initialize");

        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(WRITER_QUEUE_DEPTH);
        tokio::spawn(write_loop(writer, writer_rx));

        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let inner = Arc::new(Mutex::new(Inner { client, dispatcher }));
        let reader = tokio::spawn(read_loop(reader, inner.clone(), events.clone()));

        Ok(Self {
            inner,
            writer_tx: Some(writer_tx),
            events,
            handshake: Some((init_seq, handshake_rx)),
            child: None,
            reader: Some(reader),
            options,
        })
    }

    /// Spawn an adapter process and talk to it over stdio.
    ///
    /// The adapter's stderr is forwarded to the log at debug level.
    pub fn spawn(
        command: &AdapterCommand,
        init: InitializeRequestArguments,
        options: SessionOptions,
    ) -> Result<Self, DapError> {
        let mut cmd = TokioCommand::new(&command.command);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            DapError::AdapterSpawnFailed(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", command.command),
            ))
        })?;
        tracing::info!(command = %command.command, pid = ?child.id(), "spawned debug adapter");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut session = Self::from_streams(stdout, stdin, init, options)?;
        session.child = Some(child);
        Ok(session)
    }

    /// Connect to an adapter listening on `addr` (e.g. `127.0.0.1:4711`).
    pub async fn connect_tcp(
        addr: &str,
        init: InitializeRequestArguments,
        options: SessionOptions,
    ) -> Result<Self, DapError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            DapError::AdapterSpawnFailed(std::io::Error::new(e.kind(), format!("{addr}: {e}")))
        })?;
        tracing::info!(addr, "connected to debug adapter");
        let (reader, writer) = stream.into_split();
        Self::from_streams(reader, writer, init, options)
    }

    /// Send the queued `initialize` request and wait for the handshake.
    pub async fn initialize(&mut self) -> Result<Capabilities, DapError> {
        let Some((seq, rx)) = self.handshake.take() else {
            return Err(DapError::InvalidState {
                operation: "initialize".into(),
                state: self.state().await.to_string(),
            });
        };
        let writer_tx = self.writer()?.clone();
        let bytes = self.inner.lock().await.client.send();
        write_frames(&writer_tx, bytes).await?;

        let pending = PendingRequest {
            seq,
            command: "initialize".into(),
            rx,
            timeout: self.options.request_timeout,
            inner: self.inner.clone(),
            writer_tx,
        };
        pending.wait().await?;
        Ok(self.inner.lock().await.client.capabilities().clone())
    }

    fn writer(&self) -> Result<&mpsc::Sender<Vec<u8>>, DapError> {
        self.writer_tx.as_ref().ok_or(DapError::ConnectionClosed)
    }

    /// Issue a request built by `build` and return a handle to await it.
    ///
    /// `build` receives the sans-IO client and returns the request's
    /// sequence number, e.g. `|c| c.threads()`.
    pub async fn request<F>(&self, build: F) -> Result<PendingRequest, DapError>
    where
        F: FnOnce(&mut DapClient) -> Result<i64, DapError>,
    {
        let writer_tx = self.writer()?.clone();
        let (seq, command, rx, bytes) = {
            let mut guard = self.inner.lock().await;
            let seq = build(&mut guard.client)?;
            let command = guard
                .client
                .pending_command(seq)
                .unwrap_or("unknown")
                .to_string();
            let rx = guard.dispatcher.register(seq, &command);
            (seq, command, rx, guard.client.send())
        };
        if let Err(e) = write_frames(&writer_tx, bytes).await {
            let mut guard = self.inner.lock().await;
            guard.dispatcher.cancel(seq);
            guard.client.forget_request(seq);
            return Err(e);
        }

        Ok(PendingRequest {
            seq,
            command,
            rx,
            timeout: self.options.request_timeout,
            inner: self.inner.clone(),
            writer_tx,
        })
    }

    /// Run `f` against the sans-IO client, e.g. to inspect capabilities,
    /// breakpoints or execution state.
    ///
    /// Requests must go through [`DebugSession::request`], which registers
    /// and flushes them.
    pub async fn with_client<T>(&self, f: impl FnOnce(&mut DapClient) -> T) -> T {
        let mut guard = self.inner.lock().await;
        f(&mut guard.client)
    }

    /// Current protocol state.
    pub async fn state(&self) -> ClientState {
        self.inner.lock().await.client.state()
    }

    /// Subscribe to events, reverse requests and protocol errors.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Wait on `rx` for the next event named `name`.
    ///
    /// Other messages are skipped. Fails with [`DapError::ConnectionClosed`]
    /// if the connection ends first.
    pub async fn wait_for_event(
        rx: &mut broadcast::Receiver<ClientEvent>,
        name: &str,
        limit: Duration,
    ) -> Result<DebugEvent, DapError> {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::Event(event)) if event.name() == name => return Ok(event),
                    Ok(ClientEvent::ConnectionClosed) | Err(broadcast::error::RecvError::Closed) => {
                        return Err(DapError::ConnectionClosed)
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event receiver lagged");
                    }
                }
            }
        };
        timeout(limit, wait).await.map_err(|_| DapError::Timeout {
            command: format!("{name} event"),
        })?
    }

    // -- typed requests -----------------------------------------------------

    /// Send `launch`. Adapters may defer the reply until
    /// `configurationDone`, so the caller decides when to await it.
    pub async fn launch(&self, args: LaunchRequestArguments) -> Result<PendingRequest, DapError> {
        self.request(|c| c.launch(&args)).await
    }

    /// Send `attach`; see [`DebugSession::launch`].
    pub async fn attach(&self, args: AttachRequestArguments) -> Result<PendingRequest, DapError> {
        self.request(|c| c.attach(&args)).await
    }

    /// Replace the breakpoints of `source`; returns the adapter's view.
    pub async fn set_breakpoints(
        &self,
        source: Source,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>, DapError> {
        let body: SetBreakpointsResponseBody = self
            .request(|c| c.set_breakpoints(source, breakpoints))
            .await?
            .wait_body()
            .await?;
        Ok(body.breakpoints)
    }

    /// Send the tracked breakpoints of `path`.
    pub async fn sync_breakpoints(&self, path: &Path) -> Result<Vec<Breakpoint>, DapError> {
        let body: SetBreakpointsResponseBody = self
            .request(|c| c.sync_breakpoints(path))
            .await?
            .wait_body()
            .await?;
        Ok(body.breakpoints)
    }

    /// Send `configurationDone` if the adapter supports it.
    pub async fn configuration_done(&self) -> Result<(), DapError> {
        let supported = self
            .with_client(|c| c.dap_capabilities().supports_configuration_done_request)
            .await;
        if !supported {
            tracing::debug!("adapter does not support configurationDone");
            return Ok(());
        }
        self.request(|c| c.configuration_done()).await?.wait().await?;
        Ok(())
    }

    pub async fn threads(&self) -> Result<Vec<Thread>, DapError> {
        let body: ThreadsResponseBody = self.request(|c| c.threads()).await?.wait_body().await?;
        Ok(body.threads)
    }

    pub async fn stack_trace(
        &self,
        thread_id: i64,
        levels: Option<i64>,
    ) -> Result<StackTraceResponseBody, DapError> {
        self.request(|c| c.stack_trace(thread_id, None, levels))
            .await?
            .wait_body()
            .await
    }

    pub async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, DapError> {
        let body: ScopesResponseBody = self
            .request(|c| c.scopes(frame_id))
            .await?
            .wait_body()
            .await?;
        Ok(body.scopes)
    }

    pub async fn variables(&self, variables_reference: i64) -> Result<Vec<Variable>, DapError> {
        let body: VariablesResponseBody = self
            .request(|c| c.variables(variables_reference))
            .await?
            .wait_body()
            .await?;
        Ok(body.variables)
    }

    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
        context: Option<&str>,
    ) -> Result<EvaluateResponseBody, DapError> {
        self.request(|c| c.evaluate(expression, frame_id, context))
            .await?
            .wait_body()
            .await
    }

    pub async fn continue_execution(&self, thread_id: i64) -> Result<ContinueResponseBody, DapError> {
        self.request(|c| c.continue_execution(thread_id))
            .await?
            .wait_body()
            .await
    }

    pub async fn next(&self, thread_id: i64) -> Result<(), DapError> {
        self.request(|c| c.next(thread_id, None)).await?.wait().await?;
        Ok(())
    }

    pub async fn step_in(&self, thread_id: i64) -> Result<(), DapError> {
        self.request(|c| c.step_in(thread_id, None, None))
            .await?
            .wait()
            .await?;
        Ok(())
    }

    pub async fn step_out(&self, thread_id: i64) -> Result<(), DapError> {
        self.request(|c| c.step_out(thread_id, None)).await?.wait().await?;
        Ok(())
    }

    pub async fn pause(&self, thread_id: i64) -> Result<(), DapError> {
        self.request(|c| c.pause(thread_id)).await?.wait().await?;
        Ok(())
    }

    /// Send `disconnect` and wait for the acknowledgement.
    pub async fn disconnect(&self, args: DisconnectArguments) -> Result<(), DapError> {
        self.request(|c| c.disconnect(&args)).await?.wait().await?;
        Ok(())
    }

    /// Answer a reverse request.
    pub async fn respond(
        &self,
        request_seq: i64,
        command: &str,
        success: bool,
        body: Option<serde_json::Value>,
        message: Option<String>,
    ) -> Result<(), DapError> {
        let writer_tx = self.writer()?.clone();
        let bytes = {
            let mut guard = self.inner.lock().await;
            guard
                .client
                .respond(request_seq, command, success, body, message)?;
            guard.client.send()
        };
        write_frames(&writer_tx, bytes).await
    }

    /// Disconnect (when the handshake completed), stop writing, and reap
    /// the adapter process, killing it after the grace period.
    pub async fn shutdown(&mut self) -> Result<(), DapError> {
        if self.state().await == ClientState::Normal {
            if let Err(e) = self.disconnect(DisconnectArguments::default()).await {
                tracing::warn!(error = %e, "disconnect failed during shutdown");
            }
        }
        self.writer_tx = None;

        let grace = self.options.shutdown_grace;
        if let Some(mut child) = self.child.take() {
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => tracing::info!(%status, "debug adapter exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for debug adapter"),
                Err(_) => {
                    tracing::warn!(?grace, "debug adapter did not exit; killing it");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill debug adapter");
                    }
                }
            }
        }

        if let Some(mut reader) = self.reader.take() {
            if timeout(grace, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        let mut guard = self.inner.lock().await;
        guard.client.connection_closed();
        guard.dispatcher.cancel_all();
        Ok(())
    }
}

impl fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSession")
            .field("options", &self.options)
            .field("child", &self.child.as_ref().and_then(Child::id))
            .field("connected", &self.writer_tx.is_some())
            .finish()
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frames) = rx.recv().await {
        if let Err(e) = writer.write_all(&frames).await {
            tracing::warn!(error = %e, "write to debug adapter failed");
            return;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(error = %e, "flush to debug adapter failed");
            return;
        }
        tracing::trace!(bytes = frames.len(), "sent to debug adapter");
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(error = %e, "closing adapter input failed");
    }
}

async fn read_loop<R>(mut reader: R, inner: Arc<Mutex<Inner>>, events: broadcast::Sender<ClientEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "read from debug adapter failed");
                break;
            }
        };
        tracing::trace!(bytes = n, "received from debug adapter");

        let mut guard = inner.lock().await;
        let decoded = guard.client.recv(&buf[..n]);
        for event in decoded {
            route_event(&mut guard.dispatcher, &events, event);
        }
    }

    let mut guard = inner.lock().await;
    guard.client.connection_closed();
    guard.dispatcher.cancel_all();
    // No subscribers is fine.
    let _ = events.send(ClientEvent::ConnectionClosed);
}

/// Deliver responses to their waiters; publish everything else.
fn route_event(
    dispatcher: &mut Dispatcher,
    events: &broadcast::Sender<ClientEvent>,
    event: ClientEvent,
) {
    let (seq, outcome) = match event {
        ClientEvent::HandshakeCompleted {
            request_seq,
            ref capabilities,
        } => (
            request_seq,
            ResponseOutcome::Success(ResponseEvent {
                request_seq,
                command: "initialize".into(),
                body: serde_json::to_value(capabilities).ok(),
                message: None,
            }),
        ),
        ClientEvent::Disconnected { request_seq } => (
            request_seq,
            ResponseOutcome::Success(ResponseEvent {
                request_seq,
                command: "disconnect".into(),
                body: None,
                message: None,
            }),
        ),
        ClientEvent::Response(ref response) => {
            (response.request_seq, ResponseOutcome::Success(response.clone()))
        }
        ClientEvent::ErrorResponse(ref failure) => {
            (failure.request_seq, ResponseOutcome::Failure(failure.clone()))
        }
        other => {
            let _ = events.send(other);
            return;
        }
    };
    if !dispatcher.resolve(seq, outcome) {
        let _ = events.send(event);
    }
}

async fn forward_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "dapc::adapter", "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "adapter stderr closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameDecoder;
    use crate::protocol::ProtocolMessage;
    use serde_json::json;
    use tokio::io::{duplex, DuplexStream};

    /// The adapter side of an in-memory connection.
    struct FakeAdapter {
        stream: DuplexStream,
        decoder: FrameDecoder,
        seq: i64,
    }

    impl FakeAdapter {
        async fn next_request(&mut self) -> crate::protocol::Request {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(batch) = self.decoder.next_frame().unwrap() {
                    match batch.into_iter().next().unwrap() {
                        ProtocolMessage::Request(r) => return r,
                        other => panic!("expected request, got {other:?}"),
                    }
                }
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed the stream");
                self.decoder.push(&buf[..n]);
            }
        }

        async fn send(&mut self, mut value: serde_json::Value) {
            self.seq += 1;
            value["seq"] = json!(self.seq);
            let body = value.to_string();
            let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
            self.stream.write_all(frame.as_bytes()).await.unwrap();
        }

        async fn respond(&mut self, req: &crate::protocol::Request, body: serde_json::Value) {
            self.send(json!({
                "type": "response",
                "request_seq": req.seq,
                "command": req.command,
                "success": true,
                "body": body
            }))
            .await;
        }
    }

    fn pair() -> (DebugSession, FakeAdapter) {
        let (client_side, adapter_side) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(client_side);
        let init = InitializeRequestArguments {
            adapter_id: "fake".into(),
            ..Default::default()
        };
        let session = DebugSession::from_streams(reader, writer, init, SessionOptions::default())
            .unwrap();
        let adapter = FakeAdapter {
            stream: adapter_side,
            decoder: FrameDecoder::new(),
            seq: 0,
        };
        (session, adapter)
    }

    #[tokio::test]
    async fn connection_initialize_returns_capabilities() {
        let (mut session, mut adapter) = pair();
        let handshake = tokio::spawn(async move {
            let req = adapter.next_request().await;
            assert_eq!(req.command, "initialize");
            assert_eq!(req.seq, 1);
            adapter
                .respond(&req, json!({"supportsConfigurationDoneRequest": true}))
                .await;
            adapter
        });

        let caps = session.initialize().await.unwrap();
        assert_eq!(caps.supports_configuration_done_request, Some(true));
        assert_eq!(session.state().await, ClientState::Normal);
        handshake.await.unwrap();

        assert!(matches!(
            session.initialize().await,
            Err(DapError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn connection_rejected_request_maps_to_error() {
        let (mut session, mut adapter) = pair();
        let script = tokio::spawn(async move {
            let init = adapter.next_request().await;
            adapter.respond(&init, json!({})).await;
            let req = adapter.next_request().await;
            adapter
                .send(json!({
                    "type": "response",
                    "request_seq": req.seq,
                    "command": req.command,
                    "success": false,
                    "message": "notStopped"
                }))
                .await;
            adapter
        });

        session.initialize().await.unwrap();
        let err = session.next(1).await.unwrap_err();
        match err {
            DapError::Rejected { command, message } => {
                assert_eq!(command, "next");
                assert_eq!(message, "notStopped");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        script.await.unwrap();
    }

    #[tokio::test]
    async fn connection_request_after_close_fails() {
        let (mut session, adapter) = pair();
        drop(adapter);
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, DapError::ConnectionClosed), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_spawn_nonexistent_command() {
        let command = AdapterCommand::new("definitely-not-a-real-adapter-xyz", vec![]);
        let init = InitializeRequestArguments {
            adapter_id: "none".into(),
            ..Default::default()
        };
        let err = DebugSession::spawn(&command, init, SessionOptions::default()).unwrap_err();
        match err {
            DapError::AdapterSpawnFailed(e) => {
                assert!(e.to_string().contains("definitely-not-a-real-adapter-xyz"))
            }
            other => panic!("expected AdapterSpawnFailed, got {other:?}"),
        }
    }
}
