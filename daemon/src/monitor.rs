//! Background memory tracking of a single process
//!
//! Each [`TrackedMonitor`] owns one tokio task that polls its target every
//! [`POLL_INTERVAL`] and keeps the last [`HISTORY_CAPACITY`] readings.
//!
//! All observable state is one [`MonitorSnapshot`] held in a
//! `tokio::sync::watch` channel. Every change (status transition, elapsed
//! time, history append plus eviction) is applied inside a single
//! `send_if_modified` call, so a reader on any thread sees whole snapshots
//! only. The polling task is the only writer of history and of the
//! `Exited`/`AccessDenied` transitions; [`TrackedMonitor::request_stop`] only
//! performs `Active -> Cancelled` and fires the cancellation token.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::ProcessCollector;
use crate::error::ProbeError;
use crate::record::format_megabytes;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Active,
    Cancelled,
    Exited,
    AccessDenied,
}

impl MonitorStatus {
    pub fn is_terminal(self) -> bool {
        self != MonitorStatus::Active
    }

    pub fn label(self) -> &'static str {
        match self {
            MonitorStatus::Active => "Tracking active",
            MonitorStatus::Cancelled => "Stopped",
            MonitorStatus::Exited => "Process exited",
            MonitorStatus::AccessDenied => "Process unavailable",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A timestamped resident-memory reading.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    pub at: DateTime<Local>,
    pub memory_bytes: u64,
}

impl MemorySample {
    pub fn new(at: DateTime<Local>, memory_bytes: u64) -> Self {
        Self { at, memory_bytes }
    }

    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / 1024.0 / 1024.0
    }
}

impl fmt::Display for MemorySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.at.format("%H:%M:%S"),
            format_megabytes(self.memory_bytes)
        )
    }
}

/// Fixed-capacity history; the oldest reading is evicted first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryHistory {
    samples: VecDeque<MemorySample>,
}

impl MemoryHistory {
    pub fn push(&mut self, sample: MemorySample) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MemorySample> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MemorySample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<MemorySample> {
        self.samples.iter().cloned().collect()
    }
}

/// Formats a duration as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Everything a consumer can observe about a monitor at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub status: MonitorStatus,
    pub elapsed: Duration,
    pub history: MemoryHistory,
    /// Successful polls since start, including evicted ones.
    pub polls: u64,
}

impl MonitorSnapshot {
    fn initial() -> Self {
        Self {
            status: MonitorStatus::Active,
            elapsed: Duration::ZERO,
            history: MemoryHistory::default(),
            polls: 0,
        }
    }

    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

enum PollOutcome {
    Sample(u64),
    Exited,
    Unreadable(ProbeError),
}

fn probe(collector: &dyn ProcessCollector, pid: u32) -> PollOutcome {
    match collector.is_alive(pid) {
        Ok(true) => {}
        Ok(false) | Err(ProbeError::NotFound) => return PollOutcome::Exited,
        Err(err) => return PollOutcome::Unreadable(err),
    }
    match collector.read_memory(pid) {
        Ok(bytes) => PollOutcome::Sample(bytes),
        Err(ProbeError::NotFound) => PollOutcome::Exited,
        Err(err) => PollOutcome::Unreadable(err),
    }
}

/// Moves an active monitor to `status`. Returns false if already terminal.
fn transition(state: &watch::Sender<MonitorSnapshot>, status: MonitorStatus) -> bool {
    state.send_if_modified(|snapshot| {
        if snapshot.status.is_terminal() {
            return false;
        }
        snapshot.status = status;
        true
    })
}

/// An independent polling session observing one process's memory.
pub struct TrackedMonitor {
    session: u64,
    pid: u32,
    name: String,
    started_at: DateTime<Local>,
    state: Arc<watch::Sender<MonitorSnapshot>>,
    cancel: CancellationToken,
}

impl TrackedMonitor {
    /// Spawns the polling task on the current tokio runtime. The first poll
    /// happens immediately.
    pub fn start(
        session: u64,
        pid: u32,
        name: impl Into<String>,
        collector: Arc<dyn ProcessCollector>,
    ) -> Self {
        let name = name.into();
        let (tx, _rx) = watch::channel(MonitorSnapshot::initial());
        let state = Arc::new(tx);
        let cancel = CancellationToken::new();

        info!("Tracking session {} started for {} (pid {})", session, name, pid);
        tokio::spawn(poll_loop(
            session,
            pid,
            collector,
            Arc::clone(&state),
            cancel.clone(),
            Instant::now(),
        ));

        Self {
            session,
            pid,
            name,
            started_at: Local::now(),
            state,
            cancel,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn status(&self) -> MonitorStatus {
        self.state.borrow().status
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.borrow().clone()
    }

    pub fn history(&self) -> Vec<MemorySample> {
        self.state.borrow().history.to_vec()
    }

    /// Receiver notified on every status, elapsed-time or history change.
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.state.subscribe()
    }

    /// Stops tracking. Only the first call on an active monitor has an
    /// effect; it returns true in that case.
    pub fn request_stop(&self) -> bool {
        let stopped = transition(&self.state, MonitorStatus::Cancelled);
        self.cancel.cancel();
        if stopped {
            info!("Tracking session {} stopped (pid {})", self.session, self.pid);
        }
        stopped
    }

    /// Resolves once the monitor has reached a terminal status.
    pub async fn finished(&self) -> MonitorStatus {
        let mut rx = self.subscribe();
        let status = rx.wait_for(|snapshot| snapshot.status.is_terminal()).await.map(|s| s.status);
        status.unwrap_or_else(|_| self.status())
    }
}

impl fmt::Debug for TrackedMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedMonitor")
            .field("session", &self.session)
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for TrackedMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    session: u64,
    pid: u32,
    collector: Arc<dyn ProcessCollector>,
    state: Arc<watch::Sender<MonitorSnapshot>>,
    cancel: CancellationToken,
    started: Instant,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let elapsed = started.elapsed();
        state.send_if_modified(|snapshot| {
            if snapshot.status.is_terminal() {
                return false;
            }
            snapshot.elapsed = elapsed;
            true
        });

        let probe_collector = Arc::clone(&collector);
        let outcome = match tokio::task::spawn_blocking(move || probe(probe_collector.as_ref(), pid))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => PollOutcome::Unreadable(ProbeError::Io(e.to_string())),
        };

        // A read that finishes after a stop request is discarded.
        if cancel.is_cancelled() {
            break;
        }

        match outcome {
            PollOutcome::Sample(bytes) => {
                let sample = MemorySample::new(Local::now(), bytes);
                state.send_if_modified(|snapshot| {
                    if snapshot.status.is_terminal() {
                        return false;
                    }
                    snapshot.history.push(sample);
                    snapshot.polls += 1;
                    true
                });
            }
            PollOutcome::Exited => {
                if transition(&state, MonitorStatus::Exited) {
                    info!("Tracking session {}: pid {} exited", session, pid);
                }
                break;
            }
            PollOutcome::Unreadable(err) => {
                if transition(&state, MonitorStatus::AccessDenied) {
                    warn!("Tracking session {}: pid {} unreadable: {}", session, pid, err);
                }
                break;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
    debug!("Tracking session {} poll loop finished", session);
}
