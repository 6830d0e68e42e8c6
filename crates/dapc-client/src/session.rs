//! Execution state of the debuggee, as reported by adapter events.

use std::collections::BTreeSet;

use crate::events::{DebugEvent, StopReason};

/// What the debuggee is currently doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggeeState {
    /// No `process`, `stopped` or `continued` seen yet.
    NotStarted,
    /// The debuggee is running.
    Running,
    /// The debuggee is stopped (e.g. at a breakpoint).
    Stopped {
        /// Thread that stopped, if the adapter named one.
        thread_id: Option<i64>,
        /// Why it stopped.
        reason: StopReason,
        /// Whether every thread is stopped.
        all_threads_stopped: bool,
    },
    /// The debuggee exited with the given code.
    Exited { exit_code: i64 },
    /// The debug session ended.
    Terminated,
}

impl DebuggeeState {
    /// Whether the debuggee has exited or the session terminated.
    pub fn is_finished(&self) -> bool {
        matches!(self, DebuggeeState::Exited { .. } | DebuggeeState::Terminated)
    }
}

/// Tracks [`DebuggeeState`] and live threads.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
    state: DebuggeeState,
    threads: BTreeSet<i64>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            state: DebuggeeState::NotStarted,
            threads: BTreeSet::new(),
        }
    }

    /// Current debuggee state.
    pub fn state(&self) -> &DebuggeeState {
        &self.state
    }

    /// Ids of threads reported as started and not yet exited.
    pub fn threads(&self) -> impl Iterator<Item = i64> + '_ {
        self.threads.iter().copied()
    }

    /// The thread of the last stop, while stopped.
    pub fn stopped_thread(&self) -> Option<i64> {
        match &self.state {
            DebuggeeState::Stopped { thread_id, .. } => *thread_id,
            _ => None,
        }
    }

    /// Record a successful resume request (`continue`, `next`, `stepIn`,
    /// `stepOut`). Adapters do not send `continued` for these.
    pub fn mark_running(&mut self) {
        if !self.state.is_finished() {
            self.state = DebuggeeState::Running;
        }
    }

    /// Apply an adapter event. Returns `true` if the state changed.
    pub fn handle_event(&mut self, event: &DebugEvent) -> bool {
        let before = self.state.clone();
        match event {
            DebugEvent::Process(_) => {
                if self.state == DebuggeeState::NotStarted {
                    self.state = DebuggeeState::Running;
                }
            }
            DebugEvent::Stopped(body) => {
                if let Some(id) = body.thread_id {
                    self.threads.insert(id);
                }
                self.state = DebuggeeState::Stopped {
                    thread_id: body.thread_id,
                    reason: body.reason.clone(),
                    all_threads_stopped: body.all_threads_stopped.unwrap_or(false),
                };
            }
            DebugEvent::Continued(body) => {
                let all = body.all_threads_continued.unwrap_or(true);
                let same_thread = self.stopped_thread() == Some(body.thread_id);
                if all || same_thread || self.stopped_thread().is_none() {
                    self.mark_running();
                }
            }
            DebugEvent::Thread(body) => match body.reason.as_str() {
                "started" => {
                    self.threads.insert(body.thread_id);
                }
                "exited" => {
                    self.threads.remove(&body.thread_id);
                }
                _ => {}
            },
            DebugEvent::Exited(body) => {
                self.state = DebuggeeState::Exited {
                    exit_code: body.exit_code,
                };
            }
            DebugEvent::Terminated(_) => {
                if !matches!(self.state, DebuggeeState::Exited { .. }) {
                    self.state = DebuggeeState::Terminated;
                }
                self.threads.clear();
            }
            _ => {}
        }
        if before != self.state {
            tracing::debug!(from = ?before, to = ?self.state, "debuggee state changed");
            true
        } else {
            false
        }
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        ContinuedEventBody, ExitedEventBody, StoppedEventBody, TerminatedEventBody,
        ThreadEventBody,
    };

    fn stopped(thread_id: i64, reason: StopReason) -> DebugEvent {
        DebugEvent::Stopped(StoppedEventBody {
            reason,
            description: None,
            thread_id: Some(thread_id),
            preserve_focus_hint: None,
            text: None,
            all_threads_stopped: Some(true),
            hit_breakpoint_ids: None,
        })
    }

    fn thread(reason: &str, id: i64) -> DebugEvent {
        DebugEvent::Thread(ThreadEventBody {
            reason: reason.into(),
            thread_id: id,
        })
    }

    #[test]
    fn tracker_lifecycle_happy_path() {
        let mut tracker = ExecutionTracker::new();
        assert_eq!(tracker.state(), &DebuggeeState::NotStarted);

        assert!(tracker.handle_event(&stopped(1, StopReason::Entry)));
        assert_eq!(tracker.stopped_thread(), Some(1));

        tracker.mark_running();
        assert_eq!(tracker.state(), &DebuggeeState::Running);

        tracker.handle_event(&stopped(1, StopReason::Breakpoint));
        assert!(matches!(
            tracker.state(),
            DebuggeeState::Stopped { reason: StopReason::Breakpoint, all_threads_stopped: true, .. }
        ));

        tracker.handle_event(&DebugEvent::Exited(ExitedEventBody { exit_code: 3 }));
        tracker.handle_event(&DebugEvent::Terminated(TerminatedEventBody::default()));
        assert_eq!(tracker.state(), &DebuggeeState::Exited { exit_code: 3 });
        assert!(tracker.state().is_finished());
    }

    #[test]
    fn tracker_terminated_without_exit() {
        let mut tracker = ExecutionTracker::new();
        tracker.handle_event(&thread("started", 1));
        tracker.handle_event(&DebugEvent::Terminated(TerminatedEventBody::default()));
        assert_eq!(tracker.state(), &DebuggeeState::Terminated);
        assert_eq!(tracker.threads().count(), 0);

        tracker.mark_running();
        assert_eq!(tracker.state(), &DebuggeeState::Terminated);
    }

    #[test]
    fn tracker_thread_events() {
        let mut tracker = ExecutionTracker::new();
        tracker.handle_event(&thread("started", 1));
        tracker.handle_event(&thread("started", 2));
        tracker.handle_event(&thread("exited", 1));
        assert_eq!(tracker.threads().collect::<Vec<_>>(), vec![2]);
        assert_eq!(tracker.state(), &DebuggeeState::NotStarted);
    }

    #[test]
    fn tracker_continued_other_thread_keeps_stop() {
        let mut tracker = ExecutionTracker::new();
        tracker.handle_event(&stopped(1, StopReason::Pause));

        let other = DebugEvent::Continued(ContinuedEventBody {
            thread_id: 2,
            all_threads_continued: Some(false),
        });
        assert!(!tracker.handle_event(&other));
        assert_eq!(tracker.stopped_thread(), Some(1));

        let same = DebugEvent::Continued(ContinuedEventBody {
            thread_id: 1,
            all_threads_continued: Some(false),
        });
        assert!(tracker.handle_event(&same));
        assert_eq!(tracker.state(), &DebuggeeState::Running);
    }

    #[test]
    fn tracker_ignores_unrelated_events() {
        let mut tracker = ExecutionTracker::new();
        assert!(!tracker.handle_event(&DebugEvent::Initialized));
        assert_eq!(tracker.state(), &DebuggeeState::NotStarted);
    }
}
