use super::{Priority, ProcessCollector, ProcessEntry, ProcessMetrics, ThreadInfo};
use crate::error::{EnumerationError, OperationError, ProbeError};
use crate::executor;
use chrono::{DateTime, Local, TimeZone};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Fields of `/proc/<pid>/stat` that come after the parenthesised name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatFields {
    name: String,
    state: char,
    nice: i32,
    num_threads: u32,
    start_ticks: u64,
}

/// The command name may itself contain spaces and parentheses, so the
/// remaining fields are split after the *last* closing parenthesis.
fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let name = content.get(open + 1..close)?.to_string();
    // rest[0] is field 3 of proc(5)
    let rest: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
    if rest.len() < 20 {
        return None;
    }
    Some(StatFields {
        name,
        state: rest[0].chars().next()?,
        nice: rest[16].parse().ok()?,
        num_threads: rest[17].parse().ok()?,
        start_ticks: rest[19].parse().ok()?,
    })
}

fn describe_state(state: char) -> &'static str {
    match state {
        'R' => "Running",
        'S' => "Sleeping",
        'D' => "Waiting",
        'T' | 't' => "Stopped",
        'Z' => "Zombie",
        'X' | 'x' => "Dead",
        'I' => "Idle",
        'P' => "Parked",
        _ => "Unknown",
    }
}

/// Reads process information from a procfs mount.
pub struct LinuxProcessCollector {
    root: PathBuf,
    page_size: u64,
    clock_ticks: u64,
    boot_time: i64,
}

impl LinuxProcessCollector {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(1) as u64;
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) }.max(1) as u64;
        let boot_time = Self::read_boot_time(&root);
        Self {
            root,
            page_size,
            clock_ticks,
            boot_time,
        }
    }

    fn read_boot_time(root: &Path) -> i64 {
        let stat = fs::read_to_string(root.join("stat")).unwrap_or_default();
        stat.lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    fn proc_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn read_stat(&self, pid: u32) -> Result<StatFields, ProbeError> {
        let content = fs::read_to_string(self.proc_dir(pid).join("stat"))?;
        parse_stat(&content).ok_or_else(|| ProbeError::Io(format!("malformed stat for pid {}", pid)))
    }

    fn read_resident_bytes(&self, pid: u32) -> Result<u64, ProbeError> {
        let content = fs::read_to_string(self.proc_dir(pid).join("statm"))?;
        let resident: u64 = content
            .split_whitespace()
            .nth(1)
            .and_then(|pages| pages.parse().ok())
            .ok_or_else(|| ProbeError::Io(format!("malformed statm for pid {}", pid)))?;
        Ok(resident * self.page_size)
    }

    fn read_thread_count(&self, pid: u32) -> Result<u32, ProbeError> {
        let content = fs::read_to_string(self.proc_dir(pid).join("status"))?;
        content
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| ProbeError::Io(format!("no thread count for pid {}", pid)))
    }

    fn start_time(&self, stat: &StatFields) -> Result<DateTime<Local>, ProbeError> {
        let secs = self.boot_time + (stat.start_ticks / self.clock_ticks) as i64;
        Local
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| ProbeError::Io(format!("start time {} out of range", secs)))
    }
}

impl Default for LinuxProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector for LinuxProcessCollector {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, EnumerationError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| EnumerationError(format!("{}: {}", self.root.display(), e)))?;
        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            // Processes that exit mid-scan are simply not part of this snapshot.
            if let Ok(stat) = self.read_stat(pid) {
                processes.push(ProcessEntry::new(pid, stat.name));
            }
        }
        Ok(processes)
    }

    fn is_alive(&self, pid: u32) -> Result<bool, ProbeError> {
        match self.read_stat(pid) {
            Ok(stat) => Ok(!matches!(stat.state, 'Z' | 'X' | 'x')),
            Err(ProbeError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn read_metrics(&self, pid: u32) -> ProcessMetrics {
        let stat = self.read_stat(pid);
        ProcessMetrics {
            memory_bytes: self.read_resident_bytes(pid),
            thread_count: self.read_thread_count(pid),
            start_time: stat.as_ref().map_err(Clone::clone).and_then(|s| self.start_time(s)),
            priority: stat.map(|s| Priority::from_nice(s.nice)),
        }
    }

    fn read_memory(&self, pid: u32) -> Result<u64, ProbeError> {
        self.read_resident_bytes(pid)
    }

    fn modules(&self, pid: u32) -> Result<Vec<String>, ProbeError> {
        let maps = fs::read_to_string(self.proc_dir(pid).join("maps"))?;
        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        for line in maps.lines() {
            let Some(path) = line.split_whitespace().nth(5) else {
                continue;
            };
            if !path.starts_with('/') {
                continue;
            }
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            if seen.insert(name.clone()) {
                modules.push(name);
            }
        }
        Ok(modules)
    }

    fn threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, ProbeError> {
        let task_dir = self.proc_dir(pid).join("task");
        let mut threads = Vec::new();
        for entry in fs::read_dir(&task_dir)?.flatten() {
            let Some(tid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            let state = fs::read_to_string(entry.path().join("stat"))
                .ok()
                .and_then(|content| parse_stat(&content))
                .map(|stat| describe_state(stat.state))
                .unwrap_or("Unknown");
            threads.push(ThreadInfo {
                tid,
                state: state.to_string(),
            });
        }
        threads.sort_by_key(|t| t.tid);
        Ok(threads)
    }

    fn kill(&self, pid: u32) -> Result<(), OperationError> {
        executor::kill(pid)
    }

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OperationError> {
        executor::set_priority(pid, priority)
    }
}
