//! Daemon service: the process table, tracking sessions and user actions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::{Priority, ProcessCollector};
use crate::config::{clamp_refresh_secs, Config};
use crate::details::ProcessDetails;
use crate::error::{EnumerationError, OperationError};
use crate::filter::ProcessFilter;
use crate::monitor::TrackedMonitor;
use crate::protocol::{ConfigData, ProcessData, Request, Response, StatusData, TrackedData};
use crate::record::ProcessRecord;
use crate::registry::TrackingRegistry;
use crate::socket::RequestHandler;
use crate::table::{ProcessTable, ReconcileReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub interval: Duration,
    pub auto_refresh: bool,
}

impl From<&Config> for RefreshSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.refresh_interval(),
            auto_refresh: config.general.auto_refresh,
        }
    }
}

pub struct ProcessService {
    collector: Arc<dyn ProcessCollector>,
    table: Arc<ProcessTable>,
    registry: TrackingRegistry,
    settings: watch::Sender<RefreshSettings>,
    broadcast_tx: broadcast::Sender<String>,
}

impl ProcessService {
    pub fn new(
        collector: Arc<dyn ProcessCollector>,
        config: &Config,
        broadcast_tx: broadcast::Sender<String>,
    ) -> Self {
        let (settings, _) = watch::channel(RefreshSettings::from(config));
        Self {
            registry: TrackingRegistry::new(Arc::clone(&collector)),
            collector,
            table: Arc::new(ProcessTable::new()),
            settings,
            broadcast_tx,
        }
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn registry(&self) -> &TrackingRegistry {
        &self.registry
    }

    pub fn settings(&self) -> RefreshSettings {
        *self.settings.borrow()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<RefreshSettings> {
        self.settings.subscribe()
    }

    /// Returns the interval actually applied after clamping.
    pub fn set_refresh_interval(&self, secs: u64) -> u64 {
        let secs = clamp_refresh_secs(secs);
        let interval = Duration::from_secs(secs);
        self.settings.send_if_modified(|settings| {
            let changed = settings.interval != interval;
            settings.interval = interval;
            changed
        });
        info!("Refresh interval set to {}s", secs);
        secs
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.settings.send_if_modified(|settings| {
            let changed = settings.auto_refresh != enabled;
            settings.auto_refresh = enabled;
            changed
        });
        info!("Auto refresh {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Reconciles the table against a fresh snapshot and broadcasts a status
    /// message. The table is untouched if the snapshot fails.
    pub async fn refresh(&self) -> Result<ReconcileReport, EnumerationError> {
        let table = Arc::clone(&self.table);
        let collector = Arc::clone(&self.collector);
        let report = tokio::task::spawn_blocking(move || table.reconcile(collector.as_ref()))
            .await
            .map_err(|e| EnumerationError(e.to_string()))??;

        self.broadcast(&Response::Status {
            data: StatusData {
                process_count: self.table.len(),
                added: report.added.len(),
                removed: report.removed.len(),
                active_trackers: self.registry.active_count(),
            },
        });
        Ok(report)
    }

    pub fn list(&self, filter: &ProcessFilter) -> Vec<Arc<ProcessRecord>> {
        self.table.filtered(filter)
    }

    fn record(&self, pid: u32) -> Result<Arc<ProcessRecord>, OperationError> {
        self.table
            .get(pid)
            .ok_or(OperationError::UnknownProcess { pid })
    }

    pub async fn details(&self, pid: u32) -> Result<ProcessDetails, OperationError> {
        self.record(pid)?;
        let collector = Arc::clone(&self.collector);
        let details =
            tokio::task::spawn_blocking(move || ProcessDetails::load(collector.as_ref(), pid))
                .await
                .unwrap_or_else(|e| {
                    error!("Details task for pid {} failed: {}", pid, e);
                    ProcessDetails {
                        pid,
                        ..ProcessDetails::default()
                    }
                });
        Ok(details)
    }

    /// Kills a process from the table, then refreshes the table.
    pub async fn kill(&self, pid: u32) -> Result<(), OperationError> {
        self.record(pid)?;
        let collector = Arc::clone(&self.collector);
        tokio::task::spawn_blocking(move || collector.kill(pid))
            .await
            .map_err(|e| OperationError::Kill {
                pid,
                cause: e.to_string(),
            })??;
        info!("Killed process {}", pid);
        if let Err(e) = self.refresh().await {
            warn!("Refresh after kill failed: {}", e);
        }
        Ok(())
    }

    /// Changes the priority class of a process and refreshes its record.
    pub async fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OperationError> {
        let record = self.record(pid)?;
        let collector = Arc::clone(&self.collector);
        tokio::task::spawn_blocking(move || {
            collector.set_priority(pid, priority)?;
            record.refresh(collector.as_ref());
            Ok::<(), OperationError>(())
        })
        .await
        .map_err(|e| OperationError::SetPriority {
            pid,
            cause: e.to_string(),
        })??;
        info!("Set priority of process {} to {}", pid, priority);
        Ok(())
    }

    pub async fn boost_priority(&self, pid: u32) -> Result<(), OperationError> {
        self.set_priority(pid, Priority::High).await
    }

    /// Starts tracking a process from the table.
    pub fn track(&self, pid: u32) -> Result<Arc<TrackedMonitor>, OperationError> {
        let record = self.record(pid)?;
        let monitor = self.registry.add_task(record.name(), pid);
        self.watch_for_end(Arc::clone(&monitor));
        Ok(monitor)
    }

    /// Broadcasts the session once it reaches a terminal status.
    fn watch_for_end(&self, monitor: Arc<TrackedMonitor>) {
        let broadcast_tx = self.broadcast_tx.clone();
        tokio::spawn(async move {
            let status = monitor.finished().await;
            debug!("Tracking session {} ended: {}", monitor.session(), status);
            let response = Response::Tracking {
                data: TrackedData::from(monitor.as_ref()),
            };
            if let Ok(json) = serde_json::to_string(&response) {
                let _ = broadcast_tx.send(json);
            }
        });
    }

    pub fn stop_tracking(&self, session: u64) -> Result<(), OperationError> {
        if self.registry.stop(session) {
            Ok(())
        } else {
            Err(OperationError::UnknownSession { session })
        }
    }

    pub fn discard_tracked(&self, session: u64) -> Result<(), OperationError> {
        self.registry
            .discard(session)
            .map(|_| ())
            .ok_or(OperationError::UnknownSession { session })
    }

    /// Stops every tracking session.
    pub fn shutdown(&self) -> usize {
        self.registry.stop_all()
    }

    fn broadcast(&self, response: &Response) {
        if let Ok(json) = serde_json::to_string(response) {
            // No subscribers is not an error.
            let _ = self.broadcast_tx.send(json);
        }
    }

    fn config_data(&self) -> ConfigData {
        let settings = self.settings();
        ConfigData {
            refresh_interval_secs: settings.interval.as_secs(),
            auto_refresh: settings.auto_refresh,
        }
    }
}

fn into_response(result: Result<(), OperationError>) -> Response {
    match result {
        Ok(()) => Response::success(),
        Err(e) => Response::error(e),
    }
}

#[async_trait::async_trait]
impl RequestHandler for ProcessService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::ListProcesses { params } => {
                let filter = ProcessFilter::new(params.filter.unwrap_or_default());
                let data: Vec<ProcessData> = self
                    .list(&filter)
                    .iter()
                    .map(|record| ProcessData::from(record.as_ref()))
                    .collect();
                Response::data(&data)
            }

            Request::GetDetails { params } => match self.details(params.pid).await {
                Ok(details) => Response::data(&details),
                Err(e) => Response::error(e),
            },

            Request::Refresh => match self.refresh().await {
                Ok(report) => Response::data(&serde_json::json!({
                    "added": report.added,
                    "removed": report.removed,
                })),
                Err(e) => Response::error(e),
            },

            Request::KillProcess { params } => into_response(self.kill(params.pid).await),

            Request::SetPriority { params } => {
                into_response(self.set_priority(params.pid, params.priority).await)
            }

            Request::BoostPriority { params } => into_response(self.boost_priority(params.pid).await),

            Request::TrackProcess { params } => match self.track(params.pid) {
                Ok(monitor) => Response::data(&TrackedData::from(monitor.as_ref())),
                Err(e) => Response::error(e),
            },

            Request::StopTracking { params } => into_response(self.stop_tracking(params.session)),

            Request::ListTracked => {
                let data: Vec<TrackedData> = self
                    .registry
                    .tasks()
                    .iter()
                    .map(|monitor| TrackedData::from(monitor.as_ref()))
                    .collect();
                Response::data(&data)
            }

            Request::DiscardTracked { params } => {
                into_response(self.discard_tracked(params.session))
            }

            Request::GetConfig => Response::Config {
                data: self.config_data(),
            },

            Request::SetRefreshInterval { params } => {
                self.set_refresh_interval(params.seconds);
                Response::Config {
                    data: self.config_data(),
                }
            }

            Request::SetAutoRefresh { params } => {
                self.set_auto_refresh(params.enabled);
                Response::Config {
                    data: self.config_data(),
                }
            }
        }
    }
}

/// Periodically refreshes the table while auto refresh is enabled.
///
/// A settings change re-arms the timer immediately. Enumeration failures are
/// logged and the previous table is kept.
pub async fn run_refresh_loop(service: Arc<ProcessService>, shutdown: CancellationToken) {
    let mut settings_rx = service.subscribe_settings();
    loop {
        let settings = *settings_rx.borrow_and_update();
        if !settings.auto_refresh {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(settings.interval) => {
                match service.refresh().await {
                    Ok(report) if report.membership_changed() => {
                        debug!("Refresh: +{} -{}", report.added.len(), report.removed.len());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Refresh failed, keeping previous process list: {}", e),
                }
            }
        }
    }
    info!("Refresh loop stopped");
}
