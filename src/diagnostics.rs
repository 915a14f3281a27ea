//! Diagnostic sinks.
//!
//! Components never log through a global logger directly; they are handed a
//! [`Diagnostics`] implementation instead.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::Level;

pub trait Diagnostics {
    fn emit(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.emit(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.emit(Level::ERROR, message);
    }
}

/// Forwards everything to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            _ => tracing::trace!("{}", message),
        }
    }
}

/// Keeps every message in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    records: Rc<RefCell<Vec<(Level, String)>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.borrow().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.records.borrow().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        self.records.borrow_mut().push((level, message.to_string()));
    }
}
