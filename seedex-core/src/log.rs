// SPDX-License-Identifier: MIT
//
// Seedex: Network Entropy Exchange
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/vbocan/qrng-data-diode

//! Protocol event log
//!
//! The records emitted by the transport bindings, and their order, are part of
//! the observable contract. Bindings write through [`EventLog`] so the sink can
//! be swapped: [`TracingLog`] in production, [`MemoryLog`] in tests.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Record severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    Critical,
    Emergency,
    Close,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Error => "err",
            Self::Critical => "crit",
            Self::Emergency => "emerg",
            Self::Close => "close",
        };
        f.write_str(s)
    }
}

/// Severity-leveled sink for protocol records
pub trait EventLog: Send + Sync {
    fn info(&self, msg: &str);
    fn error(&self, msg: &str);
    fn critical(&self, msg: &str);
    fn emergency(&self, msg: &str);
    fn close(&self);
}

/// Forwards protocol records to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn info(&self, msg: &str) {
        info!("{}", msg);
    }

    fn error(&self, msg: &str) {
        error!("{}", msg);
    }

    fn critical(&self, msg: &str) {
        error!(severity = "critical", "{}", msg);
    }

    fn emergency(&self, msg: &str) {
        error!(severity = "emergency", "{}", msg);
    }

    fn close(&self) {
        info!("Event log closed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// True if this entry has `severity` and its message starts with `prefix`
    pub fn matches(&self, severity: Severity, prefix: &str) -> bool {
        self.severity == severity && self.message.starts_with(prefix)
    }
}

/// Records every entry in order for later assertions
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, severity: Severity, msg: &str) {
        self.entries.lock().push(LogEntry {
            severity,
            message: msg.to_string(),
        });
    }
}

impl EventLog for MemoryLog {
    fn info(&self, msg: &str) {
        self.record(Severity::Info, msg);
    }

    fn error(&self, msg: &str) {
        self.record(Severity::Error, msg);
    }

    fn critical(&self, msg: &str) {
        self.record(Severity::Critical, msg);
    }

    fn emergency(&self, msg: &str) {
        self.record(Severity::Emergency, msg);
    }

    fn close(&self) {
        self.record(Severity::Close, "");
    }
}
