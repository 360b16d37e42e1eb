//! Process capability interface (enumerate, probe, kill, reprioritise)
//!
//! The table and the tracked monitors only talk to the operating system
//! through [`ProcessCollector`]. [`LinuxProcessCollector`] reads `/proc`.

mod linux;

pub use linux::LinuxProcessCollector;

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{EnumerationError, OperationError, ProbeError};

/// One row of a process snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self { pid, name: name.into() }
    }
}

/// Scheduling priority class, mapped onto nice values on Unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl Priority {
    pub fn nice_value(self) -> i32 {
        match self {
            Priority::Idle => 19,
            Priority::BelowNormal => 10,
            Priority::Normal => 0,
            Priority::AboveNormal => -5,
            Priority::High => -10,
            Priority::RealTime => -20,
        }
    }

    pub fn from_nice(nice: i32) -> Self {
        match nice {
            15..=i32::MAX => Priority::Idle,
            5..=14 => Priority::BelowNormal,
            -4..=4 => Priority::Normal,
            -9..=-5 => Priority::AboveNormal,
            -19..=-10 => Priority::High,
            _ => Priority::RealTime,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Idle => "Idle",
            Priority::BelowNormal => "BelowNormal",
            Priority::Normal => "Normal",
            Priority::AboveNormal => "AboveNormal",
            Priority::High => "High",
            Priority::RealTime => "RealTime",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A thread of a process, as shown in the details pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: u32,
    pub state: String,
}

/// Metrics read from one process. Every field fails independently.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessMetrics {
    pub memory_bytes: Result<u64, ProbeError>,
    pub thread_count: Result<u32, ProbeError>,
    pub start_time: Result<DateTime<Local>, ProbeError>,
    pub priority: Result<Priority, ProbeError>,
}

impl ProcessMetrics {
    /// Metrics where every field failed with the same error.
    pub fn failed(err: ProbeError) -> Self {
        Self {
            memory_bytes: Err(err.clone()),
            thread_count: Err(err.clone()),
            start_time: Err(err.clone()),
            priority: Err(err),
        }
    }
}

pub trait ProcessCollector: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, EnumerationError>;

    /// `Ok(false)` means the process is definitively gone.
    /// `Err(ProbeError::AccessDenied)` means it could not be checked.
    fn is_alive(&self, pid: u32) -> Result<bool, ProbeError>;

    fn read_metrics(&self, pid: u32) -> ProcessMetrics;

    fn read_memory(&self, pid: u32) -> Result<u64, ProbeError> {
        self.read_metrics(pid).memory_bytes
    }

    fn modules(&self, pid: u32) -> Result<Vec<String>, ProbeError>;

    fn threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, ProbeError>;

    fn kill(&self, pid: u32) -> Result<(), OperationError>;

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OperationError>;
}
