//! Scriptable in-memory collector shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use procwatch_daemon::collector::{
    Priority, ProcessCollector, ProcessEntry, ProcessMetrics, ThreadInfo,
};
use procwatch_daemon::error::{EnumerationError, OperationError, ProbeError};

pub const MB: u64 = 1024 * 1024;

pub fn start_time() -> DateTime<Local> {
    Local.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub name: String,
    pub alive: Result<bool, ProbeError>,
    /// Consumed one per memory read, then `steady_memory` is returned.
    pub memory: VecDeque<Result<u64, ProbeError>>,
    pub steady_memory: Result<u64, ProbeError>,
    pub thread_count: Result<u32, ProbeError>,
    pub start_time: Result<DateTime<Local>, ProbeError>,
    pub priority: Result<Priority, ProbeError>,
    pub modules: Result<Vec<String>, ProbeError>,
    pub threads: Result<Vec<ThreadInfo>, ProbeError>,
}

impl FakeProcess {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alive: Ok(true),
            memory: VecDeque::new(),
            steady_memory: Ok(4 * MB),
            thread_count: Ok(1),
            start_time: Ok(start_time()),
            priority: Ok(Priority::Normal),
            modules: Ok(Vec::new()),
            threads: Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct FakeState {
    order: Vec<u32>,
    processes: HashMap<u32, FakeProcess>,
    list_error: Option<String>,
    killed: Vec<u32>,
    priority_changes: Vec<(u32, Priority)>,
    metric_reads: HashMap<u32, usize>,
}

impl FakeState {
    fn next_memory(&mut self, pid: u32) -> Result<u64, ProbeError> {
        let process = self.processes.get_mut(&pid).ok_or(ProbeError::NotFound)?;
        match process.memory.pop_front() {
            Some(reading) => reading,
            None => process.steady_memory.clone(),
        }
    }
}

#[derive(Default)]
pub struct FakeCollector {
    state: Mutex<FakeState>,
}

impl FakeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector listing the given `(pid, name)` pairs, in that order.
    pub fn with_processes(processes: &[(u32, &str)]) -> Self {
        let collector = Self::new();
        collector.set_snapshot(processes);
        collector
    }

    /// Replaces the listing. Pids already known keep their scripted state.
    pub fn set_snapshot(&self, processes: &[(u32, &str)]) {
        let mut state = self.state.lock();
        state.order = processes.iter().map(|(pid, _)| *pid).collect();
        let mut next = HashMap::new();
        for (pid, name) in processes {
            let process = state
                .processes
                .remove(pid)
                .unwrap_or_else(|| FakeProcess::new(name));
            next.insert(*pid, process);
        }
        state.processes = next;
    }

    /// Edits the scripted state of a listed process.
    pub fn update(&self, pid: u32, edit: impl FnOnce(&mut FakeProcess)) {
        let mut state = self.state.lock();
        let process = state
            .processes
            .get_mut(&pid)
            .unwrap_or_else(|| panic!("pid {} is not scripted", pid));
        edit(process);
    }

    /// Queues memory readings in megabytes, followed by `then`.
    pub fn script_memory(&self, pid: u32, megabytes: &[u64], then: Result<u64, ProbeError>) {
        self.update(pid, |process| {
            process.memory = megabytes.iter().map(|mb| Ok(mb * MB)).collect();
            process.steady_memory = then;
        });
    }

    pub fn fail_listing(&self, message: Option<&str>) {
        self.state.lock().list_error = message.map(str::to_string);
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().killed.clone()
    }

    pub fn priority_changes(&self) -> Vec<(u32, Priority)> {
        self.state.lock().priority_changes.clone()
    }

    pub fn metric_reads(&self, pid: u32) -> usize {
        self.state.lock().metric_reads.get(&pid).copied().unwrap_or(0)
    }
}

impl ProcessCollector for FakeCollector {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, EnumerationError> {
        let state = self.state.lock();
        if let Some(message) = &state.list_error {
            return Err(EnumerationError(message.clone()));
        }
        Ok(state
            .order
            .iter()
            .filter_map(|pid| {
                state
                    .processes
                    .get(pid)
                    .map(|process| ProcessEntry::new(*pid, process.name.clone()))
            })
            .collect())
    }

    fn is_alive(&self, pid: u32) -> Result<bool, ProbeError> {
        let state = self.state.lock();
        match state.processes.get(&pid) {
            Some(process) => process.alive.clone(),
            None => Err(ProbeError::NotFound),
        }
    }

    fn read_metrics(&self, pid: u32) -> ProcessMetrics {
        let mut state = self.state.lock();
        *state.metric_reads.entry(pid).or_default() += 1;
        let memory_bytes = state.next_memory(pid);
        match state.processes.get(&pid) {
            Some(process) => ProcessMetrics {
                memory_bytes,
                thread_count: process.thread_count.clone(),
                start_time: process.start_time.clone(),
                priority: process.priority.clone(),
            },
            None => ProcessMetrics::failed(ProbeError::NotFound),
        }
    }

    fn read_memory(&self, pid: u32) -> Result<u64, ProbeError> {
        self.state.lock().next_memory(pid)
    }

    fn modules(&self, pid: u32) -> Result<Vec<String>, ProbeError> {
        let state = self.state.lock();
        let process = state.processes.get(&pid).ok_or(ProbeError::NotFound)?;
        process.modules.clone()
    }

    fn threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, ProbeError> {
        let state = self.state.lock();
        let process = state.processes.get(&pid).ok_or(ProbeError::NotFound)?;
        process.threads.clone()
    }

    fn kill(&self, pid: u32) -> Result<(), OperationError> {
        let mut state = self.state.lock();
        if state.processes.remove(&pid).is_none() {
            return Err(OperationError::Kill {
                pid,
                cause: "No such process".to_string(),
            });
        }
        state.order.retain(|p| *p != pid);
        state.killed.push(pid);
        Ok(())
    }

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OperationError> {
        let mut state = self.state.lock();
        let process = state
            .processes
            .get_mut(&pid)
            .ok_or_else(|| OperationError::SetPriority {
                pid,
                cause: "No such process".to_string(),
            })?;
        if matches!(process.priority, Err(ProbeError::AccessDenied)) {
            return Err(OperationError::SetPriority {
                pid,
                cause: "Permission denied".to_string(),
            });
        }
        process.priority = Ok(priority);
        state.priority_changes.push((pid, priority));
        Ok(())
    }
}
