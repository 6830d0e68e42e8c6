//! Sans-IO DAP client.
//!
//! [`DapClient`] never touches a socket or pipe. Outgoing bytes are pulled
//! with [`DapClient::send`], incoming bytes are pushed with
//! [`DapClient::recv`], which returns the resulting [`ClientEvent`]s in wire
//! order. The async [`crate::connection::DebugSession`] drives it over real
//! streams.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::breakpoint::BreakpointManager;
use crate::capabilities::DapCapabilities;
use crate::codec::{encode_message, FrameDecoder};
use crate::error::DapError;
use crate::events::DebugEvent;
use crate::protocol::{
    AttachRequestArguments, CancelArguments, Capabilities, ContinueArguments, DisconnectArguments,
    ErrorMessage, EvaluateArguments, Event, ExceptionInfoArguments, FunctionBreakpoint,
    InitializeRequestArguments, LaunchRequestArguments, ModulesArguments, NextArguments,
    PauseArguments, ProtocolMessage, Request, Response, ScopesArguments,
    SetBreakpointsArguments, SetExceptionBreakpointsArguments, SetFunctionBreakpointsArguments,
    SetVariableArguments, Source, SourceArguments, SourceBreakpoint, StackTraceArguments,
    StepInArguments, StepOutArguments, SteppingGranularity, TerminateArguments,
    VariablesArguments,
};
use crate::session::ExecutionTracker;

/// Protocol state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing sent yet.
    NotInitialized,
    /// `initialize` sent, waiting for its response.
    WaitingForInitialized,
    /// Handshake done; requests may be sent.
    Normal,
    /// `disconnect` sent, waiting for its response.
    WaitingForShutdown,
    /// The adapter acknowledged `disconnect`.
    Shutdown,
    /// The connection to the adapter is gone.
    Exited,
}

impl ClientState {
    /// Whether the `initialize` handshake has completed.
    pub fn is_initialized(self) -> bool {
        !matches!(
            self,
            ClientState::NotInitialized | ClientState::WaitingForInitialized
        )
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::NotInitialized => "not initialized",
            ClientState::WaitingForInitialized => "waiting for initialize",
            ClientState::Normal => "ready",
            ClientState::WaitingForShutdown => "waiting for disconnect",
            ClientState::Shutdown => "shut down",
            ClientState::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// A successful response that is not part of the handshake or shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    pub request_seq: i64,
    pub command: String,
    pub body: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl ResponseEvent {
    /// Decode the body into a typed response body.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, DapError> {
        let value = self
            .body
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        Ok(serde_json::from_value(value)?)
    }
}

/// A response with `success: false`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponseEvent {
    pub request_seq: i64,
    pub command: String,
    /// Short error, e.g. `cancelled` or `notStopped`.
    pub message: Option<String>,
    /// Structured error from `body.error`.
    pub error: Option<ErrorMessage>,
    pub body: Option<serde_json::Value>,
}

impl ErrorResponseEvent {
    /// Best human-readable description of the failure.
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return error.render();
        }
        self.message
            .clone()
            .unwrap_or_else(|| "request failed".to_string())
    }
}

/// Something the client observed while decoding incoming bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The `initialize` request succeeded.
    HandshakeCompleted {
        request_seq: i64,
        capabilities: Capabilities,
    },
    /// The `disconnect` request succeeded.
    Disconnected { request_seq: i64 },
    Response(ResponseEvent),
    ErrorResponse(ErrorResponseEvent),
    Event(DebugEvent),
    /// A request from the adapter; answer it with [`DapClient::respond`].
    ReverseRequest(Request),
    /// Incoming bytes could not be decoded; the receive buffer was dropped.
    ProtocolError(String),
    /// The connection to the adapter closed.
    ConnectionClosed,
}

impl ClientEvent {
    /// The request this event answers, for response-like events.
    pub fn request_seq(&self) -> Option<i64> {
        match self {
            ClientEvent::HandshakeCompleted { request_seq, .. }
            | ClientEvent::Disconnected { request_seq } => Some(*request_seq),
            ClientEvent::Response(r) => Some(r.request_seq),
            ClientEvent::ErrorResponse(r) => Some(r.request_seq),
            _ => None,
        }
    }
}

/// Sans-IO Debug Adapter Protocol client.
#[derive(Debug)]
pub struct DapClient {
    state: ClientState,
    next_seq: i64,
    initialize_seq: i64,
    send_buffer: Vec<u8>,
    decoder: FrameDecoder,
    pending: HashMap<i64, Request>,
    capabilities: Capabilities,
    resolved: DapCapabilities,
    breakpoints: BreakpointManager,
    execution: ExecutionTracker,
}

impl DapClient {
    /// Create a client and queue the `initialize` request.
    pub fn new(args: InitializeRequestArguments) -> Result<Self, DapError> {
        let mut client = Self {
            state: ClientState::NotInitialized,
            next_seq: 1,
            initialize_seq: 0,
            send_buffer: Vec::new(),
            decoder: FrameDecoder::new(),
            pending: HashMap::new(),
            capabilities: Capabilities::default(),
            resolved: DapCapabilities::default(),
            breakpoints: BreakpointManager::new(),
            execution: ExecutionTracker::new(),
        };
        client.initialize_seq =
            client.enqueue_request("initialize", Some(serde_json::to_value(args)?))?;
        client.state = ClientState::WaitingForInitialized;
        Ok(client)
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Sequence number of the `initialize` request queued by [`DapClient::new`].
    pub fn initialize_seq(&self) -> i64 {
        self.initialize_seq
    }

    /// Raw capabilities reported by the adapter.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Capabilities resolved to booleans.
    pub fn dap_capabilities(&self) -> &DapCapabilities {
        &self.resolved
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointManager {
        &mut self.breakpoints
    }

    /// Debuggee execution state as reported by events.
    pub fn execution(&self) -> &ExecutionTracker {
        &self.execution
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Command of a pending request.
    pub fn pending_command(&self, seq: i64) -> Option<&str> {
        self.pending.get(&seq).map(|r| r.command.as_str())
    }

    /// Stop tracking a pending request, e.g. after the caller gave up on it.
    pub fn forget_request(&mut self, seq: i64) -> Option<Request> {
        self.pending.remove(&seq)
    }

    /// Take every byte queued for the adapter.
    pub fn send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buffer)
    }

    /// Whether bytes are waiting to be sent.
    pub fn has_output(&self) -> bool {
        !self.send_buffer.is_empty()
    }

    /// Feed bytes received from the adapter.
    ///
    /// Returns the events decoded from every complete frame, in wire order.
    /// A decode error drops the receive buffer and is reported as a final
    /// [`ClientEvent::ProtocolError`].
    pub fn recv(&mut self, data: &[u8]) -> Vec<ClientEvent> {
        self.decoder.push(data);
        let mut events = Vec::new();
        loop {
            match self.decoder.next_frame() {
                Ok(Some(messages)) => {
                    for message in messages {
                        events.push(self.handle_message(message));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode adapter message");
                    events.push(ClientEvent::ProtocolError(e.to_string()));
                    break;
                }
            }
        }
        events
    }

    /// Record that the connection is gone.
    ///
    /// Pending requests are dropped; the caller is responsible for failing
    /// whoever waits on them.
    pub fn connection_closed(&mut self) {
        if self.state != ClientState::Exited {
            tracing::info!(from = %self.state, pending = self.pending.len(), "adapter connection closed");
        }
        self.state = ClientState::Exited;
        self.pending.clear();
        self.decoder.clear();
    }

    // -- message handling ---------------------------------------------------

    fn handle_message(&mut self, message: ProtocolMessage) -> ClientEvent {
        match message {
            ProtocolMessage::Response(resp) => self.handle_response(resp),
            ProtocolMessage::Event(event) => self.handle_event(&event),
            ProtocolMessage::Request(req) => {
                tracing::debug!(seq = req.seq, command = %req.command, "reverse request");
                ClientEvent::ReverseRequest(req)
            }
        }
    }

    fn handle_response(&mut self, resp: Response) -> ClientEvent {
        let request = self.pending.remove(&resp.request_seq);
        if request.is_none() {
            tracing::warn!(
                request_seq = resp.request_seq,
                command = %resp.command,
                "response for unknown request"
            );
        }
        let command = request
            .as_ref()
            .map_or_else(|| resp.command.clone(), |r| r.command.clone());
        tracing::debug!(
            request_seq = resp.request_seq,
            command = %command,
            success = resp.success,
            "response received"
        );

        if !resp.success {
            let error = resp.error();
            return ClientEvent::ErrorResponse(ErrorResponseEvent {
                request_seq: resp.request_seq,
                command,
                message: resp.message,
                error,
                body: resp.body,
            });
        }

        match command.as_str() {
            "initialize" if self.state == ClientState::WaitingForInitialized => {
                let capabilities = resp.body_as::<Capabilities>().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "malformed capabilities; assuming none");
                    Capabilities::default()
                });
                self.resolved = DapCapabilities::from_initialize_response(&capabilities);
                self.capabilities = capabilities.clone();
                self.state = ClientState::Normal;
                tracing::info!("debug adapter initialized");
                return ClientEvent::HandshakeCompleted {
                    request_seq: resp.request_seq,
                    capabilities,
                };
            }
            "disconnect" if self.state == ClientState::WaitingForShutdown => {
                self.state = ClientState::Shutdown;
                tracing::info!("debug adapter disconnected");
                return ClientEvent::Disconnected {
                    request_seq: resp.request_seq,
                };
            }
            "setBreakpoints" => {
                if let Some(req) = &request {
                    self.apply_breakpoint_reply(req, &resp);
                }
            }
            "continue" | "next" | "stepIn" | "stepOut" | "stepBack" | "reverseContinue"
            | "goto" => self.execution.mark_running(),
            _ => {}
        }

        ClientEvent::Response(ResponseEvent {
            request_seq: resp.request_seq,
            command,
            body: resp.body,
            message: resp.message,
        })
    }

    fn apply_breakpoint_reply(&mut self, request: &Request, resp: &Response) {
        let Ok(args) = request.arguments_as::<SetBreakpointsArguments>() else {
            return;
        };
        let Some(path) = args.source.path else {
            return;
        };
        match resp.body_as::<crate::protocol::SetBreakpointsResponseBody>() {
            Ok(body) => self
                .breakpoints
                .apply_set_breakpoints(Path::new(&path), &body.breakpoints),
            Err(e) => tracing::warn!(error = %e, "malformed setBreakpoints response"),
        }
    }

    fn handle_event(&mut self, event: &Event) -> ClientEvent {
        tracing::debug!(seq = event.seq, event = %event.event, "event received");
        let event = DebugEvent::from_event(event);
        self.execution.handle_event(&event);
        match &event {
            DebugEvent::Capabilities(body) => {
                if let Err(e) = self.capabilities.merge(&body.capabilities) {
                    tracing::warn!(error = %e, "failed to merge capabilities");
                }
                self.resolved = DapCapabilities::from_initialize_response(&self.capabilities);
            }
            DebugEvent::Breakpoint(body) => {
                self.breakpoints.apply_event(body);
            }
            _ => {}
        }
        ClientEvent::Event(event)
    }

    // -- outgoing messages --------------------------------------------------

    fn allocate_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn enqueue_request(
        &mut self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<i64, DapError> {
        let seq = self.allocate_seq();
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        let bytes = encode_message(&ProtocolMessage::Request(request.clone()))?;
        self.send_buffer.extend_from_slice(&bytes);
        self.pending.insert(seq, request);
        tracing::debug!(seq, command, "request queued");
        Ok(seq)
    }

    fn require_state(&self, operation: &str, allowed: &[ClientState]) -> Result<(), DapError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DapError::InvalidState {
                operation: operation.to_string(),
                state: self.state.to_string(),
            })
        }
    }

    fn request_with<T: Serialize>(&mut self, command: &str, args: &T) -> Result<i64, DapError> {
        self.require_state(command, &[ClientState::Normal])?;
        let arguments = serde_json::to_value(args)?;
        self.enqueue_request(command, Some(arguments))
    }

    /// Send an arbitrary request. Requires the handshake to be complete.
    pub fn send_request(
        &mut self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<i64, DapError> {
        self.require_state(command, &[ClientState::Normal])?;
        self.enqueue_request(command, arguments)
    }

    /// Answer a reverse request from the adapter.
    pub fn respond(
        &mut self,
        request_seq: i64,
        command: &str,
        success: bool,
        body: Option<serde_json::Value>,
        message: Option<String>,
    ) -> Result<i64, DapError> {
        if self.state == ClientState::Exited {
            return Err(DapError::InvalidState {
                operation: format!("respond to {command}"),
                state: self.state.to_string(),
            });
        }
        let seq = self.allocate_seq();
        let response = Response {
            seq,
            request_seq,
            success,
            command: command.to_string(),
            message,
            body,
        };
        let bytes = encode_message(&ProtocolMessage::Response(response))?;
        self.send_buffer.extend_from_slice(&bytes);
        tracing::debug!(seq, request_seq, command, success, "response queued");
        Ok(seq)
    }

    /// Ask the adapter to cancel a request and/or a progress.
    ///
    /// Unlike other requests this is allowed during the handshake and while
    /// waiting for `disconnect`.
    pub fn cancel(
        &mut self,
        request_id: Option<i64>,
        progress_id: Option<String>,
    ) -> Result<i64, DapError> {
        self.require_state(
            "cancel",
            &[
                ClientState::NotInitialized,
                ClientState::WaitingForInitialized,
                ClientState::Normal,
                ClientState::WaitingForShutdown,
            ],
        )?;
        let args = CancelArguments {
            request_id,
            progress_id,
        };
        self.enqueue_request("cancel", Some(serde_json::to_value(args)?))
    }

    pub fn launch(&mut self, args: &LaunchRequestArguments) -> Result<i64, DapError> {
        self.request_with("launch", args)
    }

    pub fn attach(&mut self, args: &AttachRequestArguments) -> Result<i64, DapError> {
        self.request_with("attach", args)
    }

    /// Replace all breakpoints of `source`.
    pub fn set_breakpoints(
        &mut self,
        source: Source,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<i64, DapError> {
        let args = SetBreakpointsArguments {
            source,
            breakpoints: Some(breakpoints),
            source_modified: None,
        };
        self.request_with("setBreakpoints", &args)
    }

    /// Send the breakpoint manager's breakpoints for `path`.
    ///
    /// A file without breakpoints sends an empty list, clearing the
    /// adapter's breakpoints for it.
    pub fn sync_breakpoints(&mut self, path: &Path) -> Result<i64, DapError> {
        let breakpoints = self.breakpoints.source_breakpoints(path);
        self.set_breakpoints(Source::from_path(path), breakpoints)
    }

    pub fn set_function_breakpoints(
        &mut self,
        breakpoints: Vec<FunctionBreakpoint>,
    ) -> Result<i64, DapError> {
        self.request_with(
            "setFunctionBreakpoints",
            &SetFunctionBreakpointsArguments { breakpoints },
        )
    }

    pub fn set_exception_breakpoints(&mut self, filters: Vec<String>) -> Result<i64, DapError> {
        let args = SetExceptionBreakpointsArguments {
            filters,
            filter_options: None,
        };
        self.request_with("setExceptionBreakpoints", &args)
    }

    /// Signal the end of the configuration sequence.
    pub fn configuration_done(&mut self) -> Result<i64, DapError> {
        self.require_state("configurationDone", &[ClientState::Normal])?;
        self.enqueue_request("configurationDone", None)
    }

    pub fn continue_execution(&mut self, thread_id: i64) -> Result<i64, DapError> {
        let args = ContinueArguments {
            thread_id,
            single_thread: None,
        };
        self.request_with("continue", &args)
    }

    /// Step over.
    pub fn next(
        &mut self,
        thread_id: i64,
        granularity: Option<SteppingGranularity>,
    ) -> Result<i64, DapError> {
        let args = NextArguments {
            thread_id,
            single_thread: None,
            granularity,
        };
        self.request_with("next", &args)
    }

    pub fn step_in(
        &mut self,
        thread_id: i64,
        target_id: Option<i64>,
        granularity: Option<SteppingGranularity>,
    ) -> Result<i64, DapError> {
        let args = StepInArguments {
            thread_id,
            single_thread: None,
            target_id,
            granularity,
        };
        self.request_with("stepIn", &args)
    }

    pub fn step_out(
        &mut self,
        thread_id: i64,
        granularity: Option<SteppingGranularity>,
    ) -> Result<i64, DapError> {
        let args = StepOutArguments {
            thread_id,
            single_thread: None,
            granularity,
        };
        self.request_with("stepOut", &args)
    }

    pub fn pause(&mut self, thread_id: i64) -> Result<i64, DapError> {
        self.request_with("pause", &PauseArguments { thread_id })
    }

    pub fn stack_trace(
        &mut self,
        thread_id: i64,
        start_frame: Option<i64>,
        levels: Option<i64>,
    ) -> Result<i64, DapError> {
        let args = StackTraceArguments {
            thread_id,
            start_frame,
            levels,
        };
        self.request_with("stackTrace", &args)
    }

    pub fn scopes(&mut self, frame_id: i64) -> Result<i64, DapError> {
        self.request_with("scopes", &ScopesArguments { frame_id })
    }

    pub fn variables(&mut self, variables_reference: i64) -> Result<i64, DapError> {
        let args = VariablesArguments {
            variables_reference,
            filter: None,
            start: None,
            count: None,
        };
        self.request_with("variables", &args)
    }

    pub fn set_variable(
        &mut self,
        variables_reference: i64,
        name: &str,
        value: &str,
    ) -> Result<i64, DapError> {
        let args = SetVariableArguments {
            variables_reference,
            name: name.to_string(),
            value: value.to_string(),
        };
        self.request_with("setVariable", &args)
    }

    /// Fetch source content by reference.
    pub fn source(
        &mut self,
        source_reference: i64,
        source: Option<Source>,
    ) -> Result<i64, DapError> {
        let args = SourceArguments {
            source,
            source_reference,
        };
        self.request_with("source", &args)
    }

    pub fn threads(&mut self) -> Result<i64, DapError> {
        self.require_state("threads", &[ClientState::Normal])?;
        self.enqueue_request("threads", None)
    }

    pub fn evaluate(
        &mut self,
        expression: &str,
        frame_id: Option<i64>,
        context: Option<&str>,
    ) -> Result<i64, DapError> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: context.map(str::to_string),
        };
        self.request_with("evaluate", &args)
    }

    /// Send `disconnect` and wait for the adapter to acknowledge it.
    pub fn disconnect(&mut self, args: &DisconnectArguments) -> Result<i64, DapError> {
        let seq = self.request_with("disconnect", args)?;
        self.state = ClientState::WaitingForShutdown;
        tracing::info!(seq, "disconnect requested");
        Ok(seq)
    }

    pub fn terminate(&mut self, restart: Option<bool>) -> Result<i64, DapError> {
        self.request_with("terminate", &TerminateArguments { restart })
    }

    /// Restart the session; `arguments` are the latest launch/attach
    /// arguments, if any.
    pub fn restart(&mut self, arguments: Option<serde_json::Value>) -> Result<i64, DapError> {
        let args = arguments.map(|a| serde_json::json!({ "arguments": a }));
        self.send_request("restart", args)
    }

    pub fn modules(
        &mut self,
        start_module: Option<i64>,
        module_count: Option<i64>,
    ) -> Result<i64, DapError> {
        let args = ModulesArguments {
            start_module,
            module_count,
        };
        self.request_with("modules", &args)
    }

    pub fn loaded_sources(&mut self) -> Result<i64, DapError> {
        self.send_request("loadedSources", None)
    }

    pub fn exception_info(&mut self, thread_id: i64) -> Result<i64, DapError> {
        self.request_with("exceptionInfo", &ExceptionInfoArguments { thread_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::ClientBreakpoint;
    use crate::events::StopReason;
    use crate::session::DebuggeeState;
    use serde_json::json;

    fn init_args() -> InitializeRequestArguments {
        InitializeRequestArguments {
            client_id: Some("dapc".into()),
            client_name: Some("dapc".into()),
            adapter_id: "test".into(),
            ..Default::default()
        }
    }

    fn frame(value: serde_json::Value) -> Vec<u8> {
        let body = value.to_string();
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn response(
        seq: i64,
        request_seq: i64,
        command: &str,
        success: bool,
        body: serde_json::Value,
    ) -> Vec<u8> {
        frame(json!({
            "seq": seq,
            "type": "response",
            "request_seq": request_seq,
            "command": command,
            "success": success,
            "body": body
        }))
    }

    fn event(seq: i64, name: &str, body: serde_json::Value) -> Vec<u8> {
        frame(json!({"seq": seq, "type": "event", "event": name, "body": body}))
    }

    fn sent_messages(client: &mut DapClient) -> Vec<ProtocolMessage> {
        let mut decoder = FrameDecoder::new();
        decoder.push(&client.send());
        let mut out = Vec::new();
        while let Some(batch) = decoder.next_frame().unwrap() {
            out.extend(batch);
        }
        out
    }

    fn sent_requests(client: &mut DapClient) -> Vec<Request> {
        sent_messages(client)
            .into_iter()
            .filter_map(|m| match m {
                ProtocolMessage::Request(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn ready_client() -> DapClient {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();
        let events = client.recv(&response(1, 1, "initialize", true, json!({})));
        assert!(matches!(events[0], ClientEvent::HandshakeCompleted { .. }));
        client
    }

    #[test]
    fn client_queues_initialize_on_creation() {
        let mut client = DapClient::new(init_args()).unwrap();
        assert_eq!(client.state(), ClientState::WaitingForInitialized);
        assert!(!client.is_initialized());
        assert_eq!(client.pending_count(), 1);
        assert_eq!(client.initialize_seq(), 1);
        assert_eq!(client.pending_command(1), Some("initialize"));

        let requests = sent_requests(&mut client);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].seq, 1);
        assert_eq!(requests[0].command, "initialize");
        assert_eq!(requests[0].arguments.as_ref().unwrap()["adapterID"], "test");
        assert!(!client.has_output());
    }

    #[test]
    fn client_full_lifecycle() {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();

        let events = client.recv(&response(
            1,
            1,
            "initialize",
            true,
            json!({"supportsConfigurationDoneRequest": true}),
        ));
        match &events[..] {
            [ClientEvent::HandshakeCompleted { request_seq, capabilities }] => {
                assert_eq!(*request_seq, 1);
                assert_eq!(capabilities.supports_configuration_done_request, Some(true));
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(client.state(), ClientState::Normal);
        assert!(client.dap_capabilities().supports_configuration_done_request);

        let launch = client
            .launch(&LaunchRequestArguments::program("/bin/app"))
            .unwrap();
        assert_eq!(launch, 2);
        let events = client.recv(&event(2, "initialized", json!({})));
        assert_eq!(events, vec![ClientEvent::Event(DebugEvent::Initialized)]);

        let done = client.configuration_done().unwrap();
        let mut bytes = response(3, done, "configurationDone", true, json!({}));
        bytes.extend(response(4, launch, "launch", true, json!({})));
        bytes.extend(event(
            5,
            "stopped",
            json!({"reason": "breakpoint", "threadId": 1, "allThreadsStopped": true}),
        ));
        let events = client.recv(&bytes);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].request_seq(), Some(done));
        assert_eq!(events[1].request_seq(), Some(launch));
        assert!(matches!(&events[2], ClientEvent::Event(DebugEvent::Stopped(_))));
        assert_eq!(client.execution().stopped_thread(), Some(1));

        let cont = client.continue_execution(1).unwrap();
        client.recv(&response(
            6,
            cont,
            "continue",
            true,
            json!({"allThreadsContinued": true}),
        ));
        assert_eq!(client.execution().state(), &DebuggeeState::Running);

        let disc = client.disconnect(&DisconnectArguments::default()).unwrap();
        assert_eq!(client.state(), ClientState::WaitingForShutdown);
        let events = client.recv(&response(7, disc, "disconnect", true, json!({})));
        assert_eq!(events, vec![ClientEvent::Disconnected { request_seq: disc }]);
        assert_eq!(client.state(), ClientState::Shutdown);
        assert!(client.is_initialized());
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn client_sequence_numbers_increment() {
        let mut client = ready_client();
        let a = client.threads().unwrap();
        let b = client.threads().unwrap();
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        let seqs: Vec<i64> = sent_requests(&mut client).iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn client_step_requests_write_expected_arguments() {
        let mut client = ready_client();
        client.next(1, None).unwrap();
        client.step_in(1, Some(4), None).unwrap();
        client
            .step_out(2, Some(SteppingGranularity::Instruction))
            .unwrap();

        let requests = sent_requests(&mut client);
        assert_eq!(requests[0].command, "next");
        assert_eq!(requests[0].arguments, Some(json!({"threadId": 1})));
        assert_eq!(requests[1].command, "stepIn");
        assert_eq!(requests[1].arguments, Some(json!({"threadId": 1, "targetId": 4})));
        assert_eq!(requests[2].command, "stepOut");
        assert_eq!(
            requests[2].arguments,
            Some(json!({"threadId": 2, "granularity": "instruction"}))
        );
    }

    #[test]
    fn client_inspection_requests() {
        let mut client = ready_client();
        client.stack_trace(1, Some(0), Some(20)).unwrap();
        client.scopes(1000).unwrap();
        client.variables(7).unwrap();
        client.evaluate("x + 1", Some(1000), Some("repl")).unwrap();
        client.set_variable(7, "x", "5").unwrap();
        client.source(3, None).unwrap();

        let requests = sent_requests(&mut client);
        let commands: Vec<&str> = requests.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(
            commands,
            vec!["stackTrace", "scopes", "variables", "evaluate", "setVariable", "source"]
        );
        assert_eq!(
            requests[0].arguments,
            Some(json!({"threadId": 1, "startFrame": 0, "levels": 20}))
        );
        assert_eq!(requests[1].arguments, Some(json!({"frameId": 1000})));
        assert_eq!(requests[2].arguments, Some(json!({"variablesReference": 7})));
        assert_eq!(
            requests[3].arguments,
            Some(json!({"expression": "x + 1", "frameId": 1000, "context": "repl"}))
        );
        assert_eq!(requests[5].arguments, Some(json!({"sourceReference": 3})));
    }

    #[test]
    fn client_supplementary_requests() {
        let mut client = ready_client();
        client.terminate(None).unwrap();
        client.restart(Some(json!({"program": "/bin/app"}))).unwrap();
        client.modules(Some(0), Some(10)).unwrap();
        client.loaded_sources().unwrap();
        client.exception_info(1).unwrap();
        client
            .set_function_breakpoints(vec![FunctionBreakpoint {
                name: "main".into(),
                condition: None,
                hit_condition: None,
            }])
            .unwrap();
        client.set_exception_breakpoints(vec!["uncaught".into()]).unwrap();
        client.pause(1).unwrap();
        client.send_request("customCommand", Some(json!({"x": 1}))).unwrap();

        let requests = sent_requests(&mut client);
        assert_eq!(requests[0].arguments, Some(json!({})));
        assert_eq!(
            requests[1].arguments,
            Some(json!({"arguments": {"program": "/bin/app"}}))
        );
        assert_eq!(requests[3].command, "loadedSources");
        assert!(requests[3].arguments.is_none());
        assert_eq!(
            requests[5].arguments,
            Some(json!({"breakpoints": [{"name": "main"}]}))
        );
        assert_eq!(requests[6].arguments, Some(json!({"filters": ["uncaught"]})));
        assert_eq!(requests[8].command, "customCommand");
        assert_eq!(client.pending_count(), 9);
    }

    #[test]
    fn client_requests_before_handshake_fail() {
        let mut client = DapClient::new(init_args()).unwrap();
        let err = client.next(1, None).unwrap_err();
        match err {
            DapError::InvalidState { operation, state } => {
                assert_eq!(operation, "next");
                assert_eq!(state, "waiting for initialize");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert!(client.threads().is_err());
        assert!(client
            .launch(&LaunchRequestArguments::default())
            .is_err());
        assert_eq!(client.pending_count(), 1);
    }

    #[test]
    fn client_requests_after_disconnect_fail() {
        let mut client = ready_client();
        client.disconnect(&DisconnectArguments::default()).unwrap();
        assert!(matches!(
            client.threads(),
            Err(DapError::InvalidState { .. })
        ));
        assert!(client.disconnect(&DisconnectArguments::default()).is_err());
    }

    #[test]
    fn client_cancel_allowed_until_shutdown() {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();
        let seq = client.cancel(Some(1), None).unwrap();
        assert_eq!(seq, 2);
        let requests = sent_requests(&mut client);
        assert_eq!(requests[0].command, "cancel");
        assert_eq!(requests[0].arguments, Some(json!({"requestId": 1})));

        client.connection_closed();
        assert_eq!(client.state(), ClientState::Exited);
        assert!(client.cancel(Some(1), None).is_err());
    }

    #[test]
    fn client_error_response_keeps_state() {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();
        let bytes = frame(json!({
            "seq": 1,
            "type": "response",
            "request_seq": 1,
            "command": "initialize",
            "success": false,
            "message": "unsupported adapter",
            "body": {"error": {"id": 1, "format": "adapter {name} refused", "variables": {"name": "test"}}}
        }));
        let events = client.recv(&bytes);
        match &events[..] {
            [ClientEvent::ErrorResponse(err)] => {
                assert_eq!(err.command, "initialize");
                assert_eq!(err.message.as_deref(), Some("unsupported adapter"));
                assert_eq!(err.describe(), "adapter test refused");
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(client.state(), ClientState::WaitingForInitialized);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn client_error_response_without_structured_error() {
        let mut client = ready_client();
        let seq = client.next(1, None).unwrap();
        let bytes = frame(json!({
            "seq": 2, "type": "response", "request_seq": seq,
            "command": "next", "success": false, "message": "notStopped"
        }));
        let events = client.recv(&bytes);
        match &events[..] {
            [ClientEvent::ErrorResponse(err)] => assert_eq!(err.describe(), "notStopped"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn client_unsolicited_output_event() {
        let mut client = ready_client();
        let events = client.recv(&event(
            2,
            "output",
            json!({"category": "stdout", "output": "hello\n"}),
        ));
        match &events[..] {
            [ClientEvent::Event(DebugEvent::Output(body))] => assert_eq!(body.output, "hello\n"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn client_generic_response_uses_pending_command() {
        let mut client = ready_client();
        let seq = client.threads().unwrap();
        let events = client.recv(&response(
            2,
            seq,
            "whatever",
            true,
            json!({"threads": [{"id": 1, "name": "main"}]}),
        ));
        match &events[..] {
            [ClientEvent::Response(resp)] => {
                assert_eq!(resp.command, "threads");
                let body: crate::protocol::ThreadsResponseBody = resp.body_as().unwrap();
                assert_eq!(body.threads[0].name, "main");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn client_unknown_request_seq_is_still_surfaced() {
        let mut client = ready_client();
        let events = client.recv(&response(2, 99, "threads", true, json!({})));
        match &events[..] {
            [ClientEvent::Response(resp)] => {
                assert_eq!(resp.request_seq, 99);
                assert_eq!(resp.command, "threads");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn client_reverse_request_and_respond() {
        let mut client = ready_client();
        let events = client.recv(&frame(json!({
            "seq": 2,
            "type": "request",
            "command": "runInTerminal",
            "arguments": {"cwd": "/tmp", "args": ["/bin/app"]}
        })));
        let request = match &events[..] {
            [ClientEvent::ReverseRequest(req)] => req.clone(),
            other => panic!("unexpected events: {other:?}"),
        };
        assert_eq!(request.command, "runInTerminal");

        let seq = client
            .respond(request.seq, &request.command, true, Some(json!({"processId": 42})), None)
            .unwrap();
        assert_eq!(seq, 2);
        let sent = sent_messages(&mut client);
        match &sent[..] {
            [ProtocolMessage::Response(resp)] => {
                assert_eq!(resp.request_seq, 2);
                assert_eq!(resp.command, "runInTerminal");
                assert!(resp.success);
                assert_eq!(resp.body, Some(json!({"processId": 42})));
            }
            other => panic!("unexpected messages: {other:?}"),
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn client_capabilities_event_merges() {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();
        client.recv(&response(
            1,
            1,
            "initialize",
            true,
            json!({"supportsConfigurationDoneRequest": true}),
        ));
        client.recv(&event(
            2,
            "capabilities",
            json!({"capabilities": {"supportsCancelRequest": true}}),
        ));
        assert_eq!(client.capabilities().supports_cancel_request, Some(true));
        assert_eq!(client.capabilities().supports_configuration_done_request, Some(true));
        assert!(client.dap_capabilities().supports_cancel_request);
    }

    #[test]
    fn client_breakpoint_verification() {
        let mut client = ready_client();
        let path = Path::new("/src/main.rs");
        client
            .breakpoints_mut()
            .add(ClientBreakpoint::new(path.to_path_buf(), 10).with_condition("i == 3"));
        client
            .breakpoints_mut()
            .add(ClientBreakpoint::new(path.to_path_buf(), 20));

        let seq = client.sync_breakpoints(path).unwrap();
        let requests = sent_requests(&mut client);
        let args = requests[0].arguments.as_ref().unwrap();
        assert_eq!(requests[0].command, "setBreakpoints");
        assert_eq!(args["source"]["path"], "/src/main.rs");
        assert_eq!(args["breakpoints"][0]["condition"], "i == 3");
        assert_eq!(args["breakpoints"][1]["line"], 20);

        client.recv(&response(
            2,
            seq,
            "setBreakpoints",
            true,
            json!({"breakpoints": [
                {"id": 1, "verified": true, "line": 10},
                {"id": 2, "verified": false, "message": "no code"}
            ]}),
        ));
        let bps = client.breakpoints().get_for_file(path);
        assert!(bps[0].verified);
        assert_eq!(bps[0].adapter_id, Some(1));
        assert!(!bps[1].verified);

        client.recv(&event(
            3,
            "breakpoint",
            json!({"reason": "changed", "breakpoint": {"id": 2, "verified": true, "line": 21}}),
        ));
        let bp = client.breakpoints().find_by_adapter_id(2).unwrap();
        assert!(bp.verified);
        assert_eq!(bp.actual_line, Some(21));
    }

    #[test]
    fn client_stop_events_update_execution() {
        let mut client = ready_client();
        client.recv(&event(
            2,
            "stopped",
            json!({"reason": "exception", "threadId": 3, "text": "ValueError"}),
        ));
        assert!(matches!(
            client.execution().state(),
            DebuggeeState::Stopped { thread_id: Some(3), reason: StopReason::Exception, .. }
        ));
        client.recv(&event(3, "exited", json!({"exitCode": 1})));
        assert_eq!(client.execution().state(), &DebuggeeState::Exited { exit_code: 1 });
    }

    #[test]
    fn client_partial_messages() {
        let mut client = DapClient::new(init_args()).unwrap();
        client.send();
        let bytes = response(1, 1, "initialize", true, json!({}));
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        assert!(client.recv(head).is_empty());
        assert_eq!(client.state(), ClientState::WaitingForInitialized);
        assert_eq!(client.recv(tail).len(), 1);
        assert_eq!(client.state(), ClientState::Normal);
    }

    #[test]
    fn client_decode_error_follows_earlier_events() {
        let mut client = ready_client();
        let mut bytes = event(2, "output", json!({"output": "a"}));
        bytes.extend_from_slice(b"Content-Length: 5\r\n\r\n{bad}");
        bytes.extend(event(3, "output", json!({"output": "lost"})));
        let events = client.recv(&bytes);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ClientEvent::Event(DebugEvent::Output(_))));
        assert!(matches!(events[1], ClientEvent::ProtocolError(_)));

        let events = client.recv(&event(4, "output", json!({"output": "b"})));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn client_connection_closed_clears_pending() {
        let mut client = ready_client();
        client.threads().unwrap();
        client.connection_closed();
        assert_eq!(client.state(), ClientState::Exited);
        assert_eq!(client.pending_count(), 0);
        assert!(client.respond(1, "runInTerminal", false, None, None).is_err());
    }

    #[test]
    fn client_forget_request() {
        let mut client = ready_client();
        let seq = client.threads().unwrap();
        assert_eq!(client.forget_request(seq).unwrap().command, "threads");
        assert!(client.pending_command(seq).is_none());
    }
}
