//! Module and thread lists for the selected process

use serde::Serialize;

use crate::collector::ProcessCollector;
use crate::error::ProbeError;

/// Maximum entries in each details list.
pub const DETAIL_LIMIT: usize = 50;

pub const NO_MODULE_ACCESS: &str = "No access to modules";
pub const NO_THREAD_ACCESS: &str = "No access to threads";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessDetails {
    pub pid: u32,
    pub modules: Vec<String>,
    pub threads: Vec<String>,
}

impl ProcessDetails {
    /// Both lists are empty for a process that has exited. A list that can't
    /// be read holds a single placeholder entry instead.
    pub fn load(collector: &dyn ProcessCollector, pid: u32) -> Self {
        let mut details = Self {
            pid,
            ..Self::default()
        };
        if matches!(collector.is_alive(pid), Ok(false) | Err(ProbeError::NotFound)) {
            return details;
        }

        details.modules = match collector.modules(pid) {
            Ok(modules) => modules.into_iter().take(DETAIL_LIMIT).collect(),
            Err(_) => vec![NO_MODULE_ACCESS.to_string()],
        };
        details.threads = match collector.threads(pid) {
            Ok(threads) => threads
                .iter()
                .take(DETAIL_LIMIT)
                .map(|t| format!("ID: {} | State: {}", t.tid, t.state))
                .collect(),
            Err(_) => vec![NO_THREAD_ACCESS.to_string()],
        };
        details
    }
}
