//! IPC protocol definitions (JSON messages)

use crate::collector::Priority;
use crate::monitor::{MemorySample, MonitorStatus, TrackedMonitor};
use crate::record::ProcessRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    ListProcesses {
        #[serde(default)]
        params: ListProcessesParams,
    },
    GetDetails { params: PidParams },
    Refresh,
    KillProcess { params: PidParams },
    SetPriority { params: SetPriorityParams },
    BoostPriority { params: PidParams },
    TrackProcess { params: PidParams },
    StopTracking { params: SessionParams },
    ListTracked,
    DiscardTracked { params: SessionParams },
    GetConfig,
    SetRefreshInterval { params: RefreshIntervalParams },
    SetAutoRefresh { params: AutoRefreshParams },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProcessesParams {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidParams {
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPriorityParams {
    pub pid: u32,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub session: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshIntervalParams {
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRefreshParams {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { data: serde_json::Value },
    Error { message: String },
    Status { data: StatusData },
    Tracking { data: TrackedData },
    Config { data: ConfigData },
}

impl Response {
    pub fn data<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Response::Response { data },
            Err(e) => Response::error(e),
        }
    }

    pub fn success() -> Self {
        Response::Response {
            data: serde_json::json!({"success": true}),
        }
    }

    pub fn error(err: impl ToString) -> Self {
        Response::Error {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessData {
    pub pid: u32,
    pub name: String,
    pub memory_bytes: u64,
    pub memory: String,
    pub thread_count: u32,
    pub start_time: Option<String>,
    pub priority: String,
}

impl From<&ProcessRecord> for ProcessData {
    fn from(record: &ProcessRecord) -> Self {
        let metrics = record.metrics();
        ProcessData {
            pid: record.pid(),
            name: record.name().to_string(),
            memory_bytes: metrics.memory_bytes,
            memory: metrics.memory_display(),
            thread_count: metrics.thread_count,
            start_time: metrics.start_time.map(|t| t.to_rfc3339()),
            priority: metrics.priority.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleData {
    pub at: String,
    pub memory_mb: f64,
    pub display: String,
}

impl From<&MemorySample> for SampleData {
    fn from(sample: &MemorySample) -> Self {
        SampleData {
            at: sample.at.to_rfc3339(),
            memory_mb: sample.memory_mb(),
            display: sample.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedData {
    pub session: u64,
    pub pid: u32,
    pub name: String,
    pub started_at: String,
    pub status: MonitorStatus,
    pub status_label: String,
    pub elapsed: String,
    pub history: Vec<SampleData>,
}

impl From<&TrackedMonitor> for TrackedData {
    fn from(monitor: &TrackedMonitor) -> Self {
        let snapshot = monitor.snapshot();
        TrackedData {
            session: monitor.session(),
            pid: monitor.pid(),
            name: monitor.name().to_string(),
            started_at: monitor.started_at().to_rfc3339(),
            status: snapshot.status,
            status_label: snapshot.status.label().to_string(),
            elapsed: snapshot.elapsed_display(),
            history: snapshot.history.iter().map(SampleData::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub process_count: usize,
    pub added: usize,
    pub removed: usize,
    pub active_trackers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    pub refresh_interval_secs: u64,
    pub auto_refresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"cmd":"kill_process","params":{"pid":42}}"#).unwrap();
        assert_eq!(request, Request::KillProcess { params: PidParams { pid: 42 } });

        let request: Request = serde_json::from_str(
            r#"{"cmd":"set_priority","params":{"pid":7,"priority":"above_normal"}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::SetPriority {
                params: SetPriorityParams {
                    pid: 7,
                    priority: Priority::AboveNormal
                }
            }
        );
    }

    #[test]
    fn test_list_processes_params_are_optional() {
        let request: Request = serde_json::from_str(r#"{"cmd":"list_processes"}"#).unwrap();
        assert_eq!(
            request,
            Request::ListProcesses {
                params: ListProcessesParams::default()
            }
        );
    }

    #[test]
    fn test_error_response_is_tagged() {
        let json = serde_json::to_string(&Response::error("boom")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }
}
