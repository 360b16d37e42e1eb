mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeCollector, MB};
use procwatch_daemon::collector::ProcessCollector;
use procwatch_daemon::error::ProbeError;
use procwatch_daemon::monitor::{MonitorStatus, TrackedMonitor, HISTORY_CAPACITY, POLL_INTERVAL};

fn start(collector: &Arc<FakeCollector>, pid: u32) -> TrackedMonitor {
    let collector: Arc<dyn ProcessCollector> = collector.clone();
    TrackedMonitor::start(1, pid, "target", collector)
}

fn history_mb(monitor: &TrackedMonitor) -> Vec<u64> {
    monitor
        .history()
        .iter()
        .map(|s| s.memory_bytes / MB)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_history_follows_memory_readings() {
    let collector = Arc::new(FakeCollector::with_processes(&[(100, "target")]));
    collector.script_memory(100, &[10, 12], Ok(11 * MB));
    let monitor = start(&collector, 100);

    let mut rx = monitor.subscribe();
    rx.wait_for(|s| s.polls >= 3).await.unwrap();

    let history = history_mb(&monitor);
    assert_eq!(&history[..3], &[10, 12, 11]);
    assert!(history[3..].iter().all(|mb| *mb == 11));
    assert_eq!(monitor.status(), MonitorStatus::Active);

    let displays: Vec<String> = monitor.history().iter().map(|s| s.to_string()).collect();
    assert!(displays[0].ends_with(" 10.00 MB"));
    assert!(displays[1].ends_with(" 12.00 MB"));
}

#[tokio::test(start_paused = true)]
async fn test_history_keeps_most_recent_readings() {
    let collector = Arc::new(FakeCollector::with_processes(&[(200, "target")]));
    let readings: Vec<u64> = (1..=11).collect();
    collector.script_memory(200, &readings, Err(ProbeError::NotFound));
    let monitor = start(&collector, 200);

    assert_eq!(monitor.finished().await, MonitorStatus::Exited);

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.polls, 11);
    assert_eq!(snapshot.history.len(), HISTORY_CAPACITY);
    assert_eq!(history_mb(&monitor), (2..=11).collect::<Vec<u64>>());

    let times: Vec<_> = monitor.history().iter().map(|s| s.at).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_time_advances_with_polls() {
    let collector = Arc::new(FakeCollector::with_processes(&[(300, "target")]));
    let monitor = start(&collector, 300);

    let mut rx = monitor.subscribe();
    rx.wait_for(|s| s.polls >= 4).await.unwrap();
    let snapshot = monitor.snapshot();
    assert!(snapshot.elapsed >= POLL_INTERVAL * 3);
    assert!(snapshot.elapsed_display().starts_with("00:00:"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let collector = Arc::new(FakeCollector::with_processes(&[(400, "target")]));
    let monitor = start(&collector, 400);

    assert!(monitor.request_stop());
    assert!(!monitor.request_stop());
    assert_eq!(monitor.status(), MonitorStatus::Cancelled);
    assert_eq!(monitor.finished().await, MonitorStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stop_requests_transition_once() {
    let collector = Arc::new(FakeCollector::with_processes(&[(500, "target")]));
    let monitor = Arc::new(start(&collector, 500));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || monitor.request_stop())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|stopped| *stopped)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(monitor.status(), MonitorStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_no_samples_after_stop() {
    let collector = Arc::new(FakeCollector::with_processes(&[(600, "target")]));
    let monitor = start(&collector, 600);

    let mut rx = monitor.subscribe();
    rx.wait_for(|s| s.polls >= 2).await.unwrap();
    monitor.request_stop();
    let frozen = monitor.snapshot();

    tokio::time::sleep(POLL_INTERVAL * 5).await;

    let later = monitor.snapshot();
    assert_eq!(later.status, MonitorStatus::Cancelled);
    assert_eq!(later.polls, frozen.polls);
    assert_eq!(later.history, frozen.history);
}

#[tokio::test(start_paused = true)]
async fn test_process_exit_ends_tracking() {
    let collector = Arc::new(FakeCollector::with_processes(&[(700, "target")]));
    collector.script_memory(700, &[3, 4], Ok(5 * MB));
    let monitor = start(&collector, 700);

    let mut rx = monitor.subscribe();
    rx.wait_for(|s| s.polls >= 2).await.unwrap();
    collector.update(700, |p| p.alive = Ok(false));

    assert_eq!(monitor.finished().await, MonitorStatus::Exited);
    let polls = monitor.snapshot().polls;
    assert!(polls >= 2);
    assert_eq!(monitor.history().len() as u64, polls.min(HISTORY_CAPACITY as u64));

    // A terminal monitor can't be stopped any more.
    assert!(!monitor.request_stop());
    assert_eq!(monitor.status(), MonitorStatus::Exited);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_process_ends_tracking() {
    let collector = Arc::new(FakeCollector::with_processes(&[(800, "target")]));
    let monitor = start(&collector, 800);
    collector.set_snapshot(&[]);

    assert_eq!(monitor.finished().await, MonitorStatus::Exited);
}

#[tokio::test(start_paused = true)]
async fn test_denied_liveness_check_marks_unavailable() {
    let collector = Arc::new(FakeCollector::with_processes(&[(900, "target")]));
    collector.update(900, |p| p.alive = Err(ProbeError::AccessDenied));
    let monitor = start(&collector, 900);

    assert_eq!(monitor.finished().await, MonitorStatus::AccessDenied);
    assert!(monitor.history().is_empty());
    assert_eq!(MonitorStatus::AccessDenied.label(), "Process unavailable");
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_memory_marks_unavailable() {
    let collector = Arc::new(FakeCollector::with_processes(&[(901, "target")]));
    collector.script_memory(901, &[20, 21], Err(ProbeError::AccessDenied));
    let monitor = start(&collector, 901);

    assert_eq!(monitor.finished().await, MonitorStatus::AccessDenied);
    assert_eq!(history_mb(&monitor), vec![20, 21]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_monitor_stops_polling() {
    let collector = Arc::new(FakeCollector::with_processes(&[(902, "target")]));
    let monitor = start(&collector, 902);
    let mut rx = monitor.subscribe();
    rx.wait_for(|s| s.polls >= 1).await.unwrap();
    drop(monitor);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let polls = rx.borrow().polls;
    tokio::time::sleep(POLL_INTERVAL * 3).await;
    assert_eq!(rx.borrow().polls, polls);
}
