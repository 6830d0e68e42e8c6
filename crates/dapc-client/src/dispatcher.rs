//! Request/response dispatcher.
//!
//! Tracks requests that someone is awaiting, by sequence number, and hands
//! each response to its waiter through a oneshot channel.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::client::{ErrorResponseEvent, ResponseEvent};

/// What a waiting request receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The adapter answered with `success: true`.
    Success(ResponseEvent),
    /// The adapter answered with `success: false`.
    Failure(ErrorResponseEvent),
}

#[derive(Debug)]
struct PendingEntry {
    command: String,
    sender: oneshot::Sender<ResponseOutcome>,
}

/// Routes responses to the tasks awaiting them.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<i64, PendingEntry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return the receiver for its response.
    pub fn register(&mut self, seq: i64, command: &str) -> oneshot::Receiver<ResponseOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            seq,
            PendingEntry {
                command: command.to_string(),
                sender: tx,
            },
        );
        rx
    }

    /// Deliver a response. Returns `false` if nobody waits for `seq`.
    pub fn resolve(&mut self, seq: i64, outcome: ResponseOutcome) -> bool {
        match self.pending.remove(&seq) {
            Some(entry) => {
                if entry.sender.send(outcome).is_err() {
                    tracing::debug!(seq, command = %entry.command, "response waiter went away");
                }
                true
            }
            None => {
                tracing::warn!(seq, "received response for unknown request");
                false
            }
        }
    }

    /// Forget a pending request. Returns `true` if it was found.
    pub fn cancel(&mut self, seq: i64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Drop every pending request; their receivers observe a closed channel.
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(count = self.pending.len(), "dropping pending requests");
        }
        self.pending.clear();
    }

    /// How many requests are pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Command of a pending request.
    pub fn command(&self, seq: i64) -> Option<&str> {
        self.pending.get(&seq).map(|e| e.command.as_str())
    }
}
