//! Registry of tracking sessions
//!
//! Sessions stay registered after they stop, exit or lose access so their
//! final history remains inspectable. Only [`TrackingRegistry::discard`]
//! removes one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::collector::ProcessCollector;
use crate::monitor::{MonitorStatus, TrackedMonitor};

pub struct TrackingRegistry {
    collector: Arc<dyn ProcessCollector>,
    next_session: AtomicU64,
    tasks: RwLock<Vec<Arc<TrackedMonitor>>>,
}

impl TrackingRegistry {
    pub fn new(collector: Arc<dyn ProcessCollector>) -> Self {
        Self {
            collector,
            next_session: AtomicU64::new(1),
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Starts tracking `pid`. Must be called from within a tokio runtime.
    pub fn add_task(&self, name: &str, pid: u32) -> Arc<TrackedMonitor> {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let monitor = Arc::new(TrackedMonitor::start(
            session,
            pid,
            name,
            Arc::clone(&self.collector),
        ));
        self.tasks.write().push(Arc::clone(&monitor));
        monitor
    }

    /// Stops the monitor but keeps it registered.
    pub fn stop_task(&self, monitor: &TrackedMonitor) {
        monitor.request_stop();
    }

    /// Stops a session by id. Returns false for an unknown session.
    pub fn stop(&self, session: u64) -> bool {
        match self.get(session) {
            Some(monitor) => {
                self.stop_task(&monitor);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, session: u64) -> Option<Arc<TrackedMonitor>> {
        self.tasks
            .read()
            .iter()
            .find(|monitor| monitor.session() == session)
            .cloned()
    }

    /// All sessions in the order they were started.
    pub fn tasks(&self) -> Vec<Arc<TrackedMonitor>> {
        self.tasks.read().clone()
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .read()
            .iter()
            .filter(|monitor| monitor.status() == MonitorStatus::Active)
            .count()
    }

    /// Stops (if needed) and removes a session.
    pub fn discard(&self, session: u64) -> Option<Arc<TrackedMonitor>> {
        let removed = {
            let mut tasks = self.tasks.write();
            let index = tasks.iter().position(|monitor| monitor.session() == session)?;
            tasks.remove(index)
        };
        removed.request_stop();
        info!("Tracking session {} discarded", session);
        Some(removed)
    }

    /// Stops every active session. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        self.tasks()
            .iter()
            .filter(|monitor| monitor.request_stop())
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
