//! Client-side breakpoint bookkeeping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::events::BreakpointEventBody;
use crate::protocol::{Breakpoint, SourceBreakpoint};

/// A breakpoint requested by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientBreakpoint {
    /// Source file path.
    pub path: PathBuf,
    /// Requested line number.
    pub line: i64,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Optional hit condition expression.
    pub hit_condition: Option<String>,
    /// Optional log message (logpoint).
    pub log_message: Option<String>,
    /// Whether the adapter has verified this breakpoint.
    pub verified: bool,
    /// Adapter-assigned ID.
    pub adapter_id: Option<i64>,
    /// Line the adapter actually placed the breakpoint on.
    pub actual_line: Option<i64>,
    /// Adapter explanation, typically why verification failed.
    pub message: Option<String>,
}

impl ClientBreakpoint {
    /// Create a new unverified breakpoint at the given path and line.
    pub fn new(path: PathBuf, line: i64) -> Self {
        Self {
            path,
            line,
            condition: None,
            hit_condition: None,
            log_message: None,
            verified: false,
            adapter_id: None,
            actual_line: None,
            message: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_hit_condition(mut self, hit_condition: impl Into<String>) -> Self {
        self.hit_condition = Some(hit_condition.into());
        self
    }

    /// Turn the breakpoint into a logpoint.
    pub fn with_log_message(mut self, msg: impl Into<String>) -> Self {
        self.log_message = Some(msg.into());
        self
    }

    /// The wire form sent in `setBreakpoints`.
    pub fn to_source_breakpoint(&self) -> SourceBreakpoint {
        SourceBreakpoint {
            line: self.line,
            column: None,
            condition: self.condition.clone(),
            hit_condition: self.hit_condition.clone(),
            log_message: self.log_message.clone(),
        }
    }

    fn apply(&mut self, reported: &Breakpoint) {
        self.verified = reported.verified;
        if reported.id.is_some() {
            self.adapter_id = reported.id;
        }
        if reported.line.is_some() {
            self.actual_line = reported.line;
        }
        self.message = reported.message.clone();
    }
}

/// Manages breakpoints across files for a debug session.
///
/// Files are kept in path order so that requests go out deterministically.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<PathBuf, Vec<ClientBreakpoint>>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Returns the index in the file's breakpoint list.
    pub fn add(&mut self, bp: ClientBreakpoint) -> usize {
        let list = self.breakpoints.entry(bp.path.clone()).or_default();
        list.push(bp);
        list.len() - 1
    }

    /// Remove the breakpoints at the given path and line.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn remove(&mut self, path: &Path, line: i64) -> bool {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return false;
        };
        let before = list.len();
        list.retain(|bp| bp.line != line);
        let removed = before != list.len();
        if list.is_empty() {
            self.breakpoints.remove(path);
        }
        removed
    }

    /// All breakpoints for a file.
    pub fn get_for_file(&self, path: &Path) -> &[ClientBreakpoint] {
        self.breakpoints.get(path).map_or(&[], |v| v.as_slice())
    }

    /// Files that currently have breakpoints.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.breakpoints.keys().map(PathBuf::as_path)
    }

    /// The `setBreakpoints` payload for one file.
    pub fn source_breakpoints(&self, path: &Path) -> Vec<SourceBreakpoint> {
        self.get_for_file(path)
            .iter()
            .map(ClientBreakpoint::to_source_breakpoint)
            .collect()
    }

    /// Apply a `setBreakpoints` reply for `path`.
    ///
    /// The adapter answers in request order, so entries are matched by
    /// position.
    pub fn apply_set_breakpoints(&mut self, path: &Path, reported: &[Breakpoint]) {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return;
        };
        if list.len() != reported.len() {
            tracing::warn!(
                path = %path.display(),
                requested = list.len(),
                reported = reported.len(),
                "setBreakpoints reply length mismatch"
            );
        }
        for (bp, adapter_bp) in list.iter_mut().zip(reported) {
            bp.apply(adapter_bp);
        }
    }

    /// Mark the breakpoints on a line as verified.
    pub fn mark_verified(&mut self, path: &Path, line: i64, adapter_id: Option<i64>) {
        if let Some(list) = self.breakpoints.get_mut(path) {
            for bp in list.iter_mut().filter(|bp| bp.line == line) {
                bp.verified = true;
                bp.adapter_id = adapter_id;
            }
        }
    }

    /// Apply a `breakpoint` event.
    ///
    /// Returns `true` if a tracked breakpoint changed.
    pub fn apply_event(&mut self, body: &BreakpointEventBody) -> bool {
        let Some(id) = body.breakpoint.id else {
            return false;
        };
        if body.reason == "removed" {
            let mut removed = false;
            for list in self.breakpoints.values_mut() {
                let before = list.len();
                list.retain(|bp| bp.adapter_id != Some(id));
                removed |= before != list.len();
            }
            self.breakpoints.retain(|_, list| !list.is_empty());
            return removed;
        }
        match self.find_by_adapter_id_mut(id) {
            Some(bp) => {
                bp.apply(&body.breakpoint);
                true
            }
            None => false,
        }
    }

    /// Look up a breakpoint by its adapter id.
    pub fn find_by_adapter_id(&self, id: i64) -> Option<&ClientBreakpoint> {
        self.all().find(|bp| bp.adapter_id == Some(id))
    }

    fn find_by_adapter_id_mut(&mut self, id: i64) -> Option<&mut ClientBreakpoint> {
        self.breakpoints
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|bp| bp.adapter_id == Some(id))
    }

    /// Remove all breakpoints for a specific file.
    pub fn clear_file(&mut self, path: &Path) {
        self.breakpoints.remove(path);
    }

    /// Iterate over all breakpoints across all files.
    pub fn all(&self) -> impl Iterator<Item = &ClientBreakpoint> {
        self.breakpoints.values().flat_map(|v| v.iter())
    }
}
