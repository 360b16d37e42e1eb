//! Per-process record with independently refreshed metric fields

use std::fmt;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use tracing::debug;

use crate::collector::{Priority, ProcessCollector, ProcessEntry, ProcessMetrics};
use crate::error::ProbeError;

/// Priority column value. `AccessDenied` is shown when the class can't be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityLabel {
    Class(Priority),
    AccessDenied,
}

impl fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityLabel::Class(priority) => f.write_str(priority.label()),
            PriorityLabel::AccessDenied => f.write_str("Access Denied"),
        }
    }
}

/// Formats a byte count as megabytes with two decimals, e.g. `"10.00 MB"`.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// The mutable part of a record. Unreadable fields hold their fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetrics {
    pub memory_bytes: u64,
    pub thread_count: u32,
    pub start_time: Option<DateTime<Local>>,
    pub priority: PriorityLabel,
}

impl Default for RecordMetrics {
    fn default() -> Self {
        Self {
            memory_bytes: 0,
            thread_count: 0,
            start_time: None,
            priority: PriorityLabel::AccessDenied,
        }
    }
}

impl RecordMetrics {
    /// Applies each field's fallback independently.
    pub fn from_reading(reading: ProcessMetrics) -> Self {
        Self {
            memory_bytes: reading.memory_bytes.unwrap_or(0),
            thread_count: reading.thread_count.unwrap_or(0),
            start_time: reading.start_time.ok(),
            priority: reading
                .priority
                .map(PriorityLabel::Class)
                .unwrap_or(PriorityLabel::AccessDenied),
        }
    }

    pub fn memory_display(&self) -> String {
        format_megabytes(self.memory_bytes)
    }
}

/// Outcome of the liveness check performed by [`ProcessRecord::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// Liveness could not be checked for lack of permission; treated as alive.
    Unknown,
    Exited,
}

/// One row of the process table.
///
/// Pid and name never change. The metrics are swapped as a whole on every
/// refresh, so readers on other threads always see a consistent block.
#[derive(Debug)]
pub struct ProcessRecord {
    pid: u32,
    name: String,
    metrics: RwLock<RecordMetrics>,
}

impl ProcessRecord {
    /// Identity comes from the snapshot entry, never from a live read.
    pub fn new(entry: &ProcessEntry, collector: &dyn ProcessCollector) -> Self {
        let record = Self {
            pid: entry.pid,
            name: entry.name.clone(),
            metrics: RwLock::new(RecordMetrics::default()),
        };
        record.refresh(collector);
        record
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> RecordMetrics {
        self.metrics.read().clone()
    }

    pub fn memory_display(&self) -> String {
        self.metrics.read().memory_display()
    }

    /// Re-reads the process. An exited process keeps its previous values.
    pub fn refresh(&self, collector: &dyn ProcessCollector) -> Liveness {
        let liveness = match collector.is_alive(self.pid) {
            Ok(true) => Liveness::Alive,
            Err(ProbeError::AccessDenied) => Liveness::Unknown,
            Ok(false) => Liveness::Exited,
            Err(err) => {
                debug!("Liveness check for pid {} failed: {}", self.pid, err);
                Liveness::Exited
            }
        };
        if liveness == Liveness::Exited {
            return liveness;
        }

        let next = RecordMetrics::from_reading(collector.read_metrics(self.pid));
        *self.metrics.write() = next;
        liveness
    }
}
