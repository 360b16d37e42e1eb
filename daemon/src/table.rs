//! Identity-preserving process table, reconciled against OS snapshots

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::collector::{ProcessCollector, ProcessEntry};
use crate::error::EnumerationError;
use crate::filter::ProcessFilter;
use crate::record::ProcessRecord;

/// What a reconcile changed. `added` and `removed` are in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
    pub refreshed: usize,
}

impl ReconcileReport {
    pub fn membership_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Default)]
struct Records {
    by_pid: HashMap<u32, Arc<ProcessRecord>>,
    order: Vec<u32>,
}

/// The managed collection of [`ProcessRecord`]s.
///
/// Records that survive a reconcile keep their `Arc`, so anything keyed on a
/// record (a selection, an open details view) stays valid across ticks.
/// Every reconcile also refreshes the metrics of surviving records.
#[derive(Default)]
pub struct ProcessTable {
    records: RwLock<Records>,
    writer: Mutex<()>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures a snapshot and reconciles against it. On failure the table is
    /// left exactly as it was.
    pub fn reconcile(
        &self,
        collector: &dyn ProcessCollector,
    ) -> Result<ReconcileReport, EnumerationError> {
        let snapshot = collector.list_processes()?;
        Ok(self.apply_snapshot(&snapshot, collector))
    }

    /// Adds unseen pids, drops vanished ones and refreshes the rest.
    ///
    /// Snapshot processing and record I/O happen outside the table lock;
    /// membership changes are applied under a single write lock so readers
    /// see either the previous or the new set.
    pub fn apply_snapshot(
        &self,
        snapshot: &[ProcessEntry],
        collector: &dyn ProcessCollector,
    ) -> ReconcileReport {
        let _writer = self.writer.lock();

        let live: HashSet<u32> = snapshot.iter().map(|entry| entry.pid).collect();
        let (fresh, survivors) = {
            let records = self.records.read();
            let mut seen = HashSet::with_capacity(snapshot.len());
            let fresh: Vec<&ProcessEntry> = snapshot
                .iter()
                .filter(|entry| !records.by_pid.contains_key(&entry.pid))
                .filter(|entry| seen.insert(entry.pid))
                .collect();
            let survivors: Vec<Arc<ProcessRecord>> = records
                .order
                .iter()
                .filter(|pid| live.contains(*pid))
                .filter_map(|pid| records.by_pid.get(pid).cloned())
                .collect();
            (fresh, survivors)
        };

        for record in &survivors {
            record.refresh(collector);
        }
        let created: Vec<Arc<ProcessRecord>> = fresh
            .into_iter()
            .map(|entry| Arc::new(ProcessRecord::new(entry, collector)))
            .collect();

        let mut guard = self.records.write();
        let Records { by_pid, order } = &mut *guard;

        let mut removed = Vec::new();
        order.retain(|pid| {
            if live.contains(pid) {
                true
            } else {
                removed.push(*pid);
                false
            }
        });
        for pid in &removed {
            by_pid.remove(pid);
        }

        let mut added = Vec::with_capacity(created.len());
        for record in created {
            let pid = record.pid();
            if let Entry::Vacant(slot) = by_pid.entry(pid) {
                slot.insert(record);
                order.push(pid);
                added.push(pid);
            }
        }

        let report = ReconcileReport {
            added,
            removed,
            refreshed: survivors.len(),
        };
        debug!(
            "Reconciled {} processes (+{} -{})",
            order.len(),
            report.added.len(),
            report.removed.len()
        );
        report
    }

    pub fn get(&self, pid: u32) -> Option<Arc<ProcessRecord>> {
        self.records.read().by_pid.get(&pid).cloned()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.records.read().by_pid.contains_key(&pid)
    }

    /// All records in order of first observation.
    pub fn records(&self) -> Vec<Arc<ProcessRecord>> {
        let records = self.records.read();
        records
            .order
            .iter()
            .filter_map(|pid| records.by_pid.get(pid).cloned())
            .collect()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.records.read().order.clone()
    }

    pub fn filtered(&self, filter: &ProcessFilter) -> Vec<Arc<ProcessRecord>> {
        let records = self.records.read();
        records
            .order
            .iter()
            .filter_map(|pid| records.by_pid.get(pid))
            .filter(|record| filter.matches_record(record))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
