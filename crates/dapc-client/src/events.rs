//! Typed adapter events.
//!
//! [`DebugEvent::from_event`] classifies a raw [`Event`] by name. An event
//! with an unknown name, or a body that does not match the expected shape,
//! becomes [`DebugEvent::Other`] instead of an error.

use serde::{Deserialize, Serialize};

use crate::protocol::{Breakpoint, Capabilities, Event, Source};

/// Reason for a `stopped` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    /// A step request completed.
    Step,
    /// A breakpoint was hit.
    Breakpoint,
    /// An exception occurred.
    Exception,
    /// A pause request was fulfilled.
    Pause,
    /// An entry point was reached.
    Entry,
    /// A goto request completed.
    Goto,
    /// A function breakpoint was hit.
    FunctionBreakpoint,
    /// A data breakpoint was hit.
    DataBreakpoint,
    /// An instruction breakpoint was hit.
    InstructionBreakpoint,
    /// A reason this client does not know about.
    Other(String),
}

impl StopReason {
    /// The wire spelling of the reason.
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
            StopReason::Pause => "pause",
            StopReason::Entry => "entry",
            StopReason::Goto => "goto",
            StopReason::FunctionBreakpoint => "function breakpoint",
            StopReason::DataBreakpoint => "data breakpoint",
            StopReason::InstructionBreakpoint => "instruction breakpoint",
            StopReason::Other(s) => s,
        }
    }
}

impl From<String> for StopReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "step" => StopReason::Step,
            "breakpoint" => StopReason::Breakpoint,
            "exception" => StopReason::Exception,
            "pause" => StopReason::Pause,
            "entry" => StopReason::Entry,
            "goto" => StopReason::Goto,
            "function breakpoint" => StopReason::FunctionBreakpoint,
            "data breakpoint" => StopReason::DataBreakpoint,
            "instruction breakpoint" => StopReason::InstructionBreakpoint,
            _ => StopReason::Other(s),
        }
    }
}

impl From<StopReason> for String {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of the `stopped` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// The reason for the stop.
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Thread that stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_focus_hint: Option<bool>,
    /// Additional text, e.g. the exception name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether all threads are stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
    /// Breakpoint ids that triggered the stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_breakpoint_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {
    /// Restart data handed back in the next `launch`/`attach`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    /// `started` or `exited`.
    pub reason: String,
    pub thread_id: i64,
}

/// Body of the `output` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    /// `console`, `important`, `stdout`, `stderr`, `telemetry` or custom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    /// `changed`, `new`, `removed` or custom.
    pub reason: String,
    pub breakpoint: Breakpoint,
}

/// A module (library, assembly) loaded by the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Number or string identifier.
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_optimized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEventBody {
    /// `new`, `changed` or `removed`.
    pub reason: String,
    pub module: Module,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSourceEventBody {
    pub reason: String,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEventBody {
    /// Logical name of the process, usually the program path.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_process_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_local_process: Option<bool>,
    /// `launch`, `attach` or `attachForSuspendedLaunch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesEventBody {
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStartEventBody {
    pub progress_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdateEventBody {
    pub progress_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEndEventBody {
    pub progress_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidatedEventBody {
    /// `all`, `stacks`, `threads` or `variables`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub areas: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_frame_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEventBody {
    pub memory_reference: String,
    pub offset: i64,
    pub count: i64,
}

/// An adapter event, classified by name.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// The adapter is ready to accept configuration requests.
    Initialized,
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Exited(ExitedEventBody),
    Terminated(TerminatedEventBody),
    Thread(ThreadEventBody),
    Output(OutputEventBody),
    Breakpoint(BreakpointEventBody),
    Module(ModuleEventBody),
    LoadedSource(LoadedSourceEventBody),
    Process(ProcessEventBody),
    Capabilities(CapabilitiesEventBody),
    ProgressStart(ProgressStartEventBody),
    ProgressUpdate(ProgressUpdateEventBody),
    ProgressEnd(ProgressEndEventBody),
    Invalidated(InvalidatedEventBody),
    Memory(MemoryEventBody),
    /// Unknown event, or a known event whose body did not parse.
    Other {
        event: String,
        body: Option<serde_json::Value>,
    },
}

impl DebugEvent {
    /// Classify a raw event.
    pub fn from_event(event: &Event) -> Self {
        let parsed = match event.event.as_str() {
            "initialized" => Some(DebugEvent::Initialized),
            "stopped" => event.body_as().ok().map(DebugEvent::Stopped),
            "continued" => event.body_as().ok().map(DebugEvent::Continued),
            "exited" => event.body_as().ok().map(DebugEvent::Exited),
            "terminated" => event.body_as().ok().map(DebugEvent::Terminated),
            "thread" => event.body_as().ok().map(DebugEvent::Thread),
            "output" => event.body_as().ok().map(DebugEvent::Output),
            "breakpoint" => event.body_as().ok().map(DebugEvent::Breakpoint),
            "module" => event.body_as().ok().map(DebugEvent::Module),
            "loadedSource" => event.body_as().ok().map(DebugEvent::LoadedSource),
            "process" => event.body_as().ok().map(DebugEvent::Process),
            "capabilities" => event.body_as().ok().map(DebugEvent::Capabilities),
            "progressStart" => event.body_as().ok().map(DebugEvent::ProgressStart),
            "progressUpdate" => event.body_as().ok().map(DebugEvent::ProgressUpdate),
            "progressEnd" => event.body_as().ok().map(DebugEvent::ProgressEnd),
            "invalidated" => event.body_as().ok().map(DebugEvent::Invalidated),
            "memory" => event.body_as().ok().map(DebugEvent::Memory),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            tracing::debug!(event = %event.event, "unclassified adapter event");
            DebugEvent::Other {
                event: event.event.clone(),
                body: event.body.clone(),
            }
        })
    }

    /// The wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            DebugEvent::Initialized => "initialized",
            DebugEvent::Stopped(_) => "stopped",
            DebugEvent::Continued(_) => "continued",
            DebugEvent::Exited(_) => "exited",
            DebugEvent::Terminated(_) => "terminated",
            DebugEvent::Thread(_) => "thread",
            DebugEvent::Output(_) => "output",
            DebugEvent::Breakpoint(_) => "breakpoint",
            DebugEvent::Module(_) => "module",
            DebugEvent::LoadedSource(_) => "loadedSource",
            DebugEvent::Process(_) => "process",
            DebugEvent::Capabilities(_) => "capabilities",
            DebugEvent::ProgressStart(_) => "progressStart",
            DebugEvent::ProgressUpdate(_) => "progressUpdate",
            DebugEvent::ProgressEnd(_) => "progressEnd",
            DebugEvent::Invalidated(_) => "invalidated",
            DebugEvent::Memory(_) => "memory",
            DebugEvent::Other { event, .. } => event,
        }
    }
}
