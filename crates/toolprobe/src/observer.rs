//! Session-scoped capture of tool invocations.
//!
//! Tools never talk to the observer directly. The registry holds a
//! [`CallSink`] and pushes one event per invocation onto an unbounded
//! channel; the [`CallObserver`] owns the receiving end and turns events
//! into ordered [`CallRecord`]s when asked for a snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::tool::QualifiedName;

/// One observed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub name: QualifiedName,
    /// Emission index within the current turn, starting at 0.
    pub sequence: u64,
}

#[derive(Debug)]
struct CallEvent {
    name: String,
    sequence: u64,
}

/// Emitting half of a session's call channel.
///
/// Cheap to clone. Emitting never blocks; if the observer has been dropped
/// the event is discarded.
#[derive(Clone)]
pub struct CallSink {
    tx: mpsc::UnboundedSender<CallEvent>,
    next_sequence: Arc<AtomicU64>,
}

impl CallSink {
    pub fn emit(&self, name: &str) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let event = CallEvent {
            name: name.to_string(),
            sequence,
        };
        if self.tx.send(event).is_err() {
            debug!(tool = name, "call observer gone, dropping call event");
        }
    }
}

/// Receiving half: collects the call records of one turn.
pub struct CallObserver {
    tx: mpsc::UnboundedSender<CallEvent>,
    rx: mpsc::UnboundedReceiver<CallEvent>,
    next_sequence: Arc<AtomicU64>,
    records: Vec<CallRecord>,
}

impl Default for CallObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CallObserver {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            next_sequence: Arc::new(AtomicU64::new(0)),
            records: Vec::new(),
        }
    }

    /// Hand out an emitting handle bound to this observer.
    pub fn attach(&self) -> CallSink {
        CallSink {
            tx: self.tx.clone(),
            next_sequence: Arc::clone(&self.next_sequence),
        }
    }

    /// Discard everything captured so far, including events still in flight,
    /// and restart sequence numbering. Must run before each new turn.
    pub fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
        self.records.clear();
        self.next_sequence.store(0, Ordering::Relaxed);
    }

    /// Ordered copy of the calls captured since the last reset.
    pub fn snapshot(&mut self) -> Vec<CallRecord> {
        self.drain();
        self.records.clone()
    }

    fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match QualifiedName::parse(&event.name) {
                Ok(name) => self.records.push(CallRecord {
                    name,
                    sequence: event.sequence,
                }),
                Err(_) => {
                    warn!(name = %event.name, "dropping call event with malformed tool name");
                }
            }
        }
    }
}
