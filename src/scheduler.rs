//! Snapshot publication and periodic polling
//!
//! [`Coordinator`] owns the acquirer and the last good snapshot. Every
//! successful cycle replaces the published `Arc<Snapshot>` wholesale; a
//! failed cycle leaves it untouched, so consumers keep seeing stale but
//! complete data across transient outages.
//!
//! [`PollScheduler`] drives [`Coordinator::refresh`] from a fixed interval
//! until stopped. Control writes call `refresh` directly; a write-triggered
//! refresh and a scheduled one may run back to back and either result is a
//! valid post-write view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::acquirer::{PollReport, SnapshotAcquirer};
use crate::client::RegisterTransport;
use crate::error::{ChargerError, ModbusResult};
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
struct UpdateStatus {
    last_update_success: bool,
    last_error: Option<String>,
    last_report: Option<PollReport>,
    failures_in_row: u32,
}

/// Holds the latest published snapshot for one charger
pub struct Coordinator<T: RegisterTransport> {
    acquirer: SnapshotAcquirer<T>,
    sender: watch::Sender<Option<Arc<Snapshot>>>,
    status: Mutex<UpdateStatus>,
    closed: AtomicBool,
}

impl<T: RegisterTransport> Coordinator<T> {
    pub fn new(acquirer: SnapshotAcquirer<T>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            acquirer,
            sender,
            status: Mutex::new(UpdateStatus::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Shared transport handle
    pub fn transport(&self) -> &Arc<T> {
        self.acquirer.transport()
    }

    fn status(&self) -> MutexGuard<'_, UpdateStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one poll cycle and publish the result if it succeeded
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ChargerError> {
        match self.acquirer.poll_with_report().await {
            Ok((snapshot, report)) => {
                let snapshot = Arc::new(snapshot);
                self.sender.send_replace(Some(snapshot.clone()));

                let mut status = self.status();
                if !status.last_update_success && status.failures_in_row > 0 {
                    info!("Charger reachable again after {} failed polls", status.failures_in_row);
                }
                status.last_update_success = true;
                status.last_error = None;
                status.last_report = Some(report);
                status.failures_in_row = 0;
                Ok(snapshot)
            }
            Err(e) => {
                let mut status = self.status();
                status.failures_in_row += 1;
                if status.failures_in_row == 1 {
                    error!("Poll cycle failed: {}", e);
                } else {
                    debug!("Poll cycle failed ({} in a row): {}", status.failures_in_row, e);
                }
                status.last_update_success = false;
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Last published snapshot, `None` before the first successful cycle
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.sender.borrow().clone()
    }

    /// Receiver that observes every publication
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.sender.subscribe()
    }

    /// Whether the most recent cycle succeeded
    pub fn last_update_success(&self) -> bool {
        self.status().last_update_success
    }

    /// Error of the most recent cycle, if it failed
    pub fn last_error(&self) -> Option<String> {
        self.status().last_error.clone()
    }

    /// Degradation report of the most recent successful cycle
    pub fn last_report(&self) -> Option<PollReport> {
        self.status().last_report.clone()
    }

    /// Close the transport. Only the first call reaches the device.
    pub async fn shutdown(&self) -> ModbusResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing charger connection");
        self.transport().close().await
    }
}

/// Calls [`Coordinator::refresh`] on a fixed interval
pub struct PollScheduler<T: RegisterTransport> {
    coordinator: Arc<Coordinator<T>>,
    interval: Duration,
    shutdown: Arc<Notify>,
    running: AtomicBool,
}

impl<T: RegisterTransport> PollScheduler<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<T>> {
        &self.coordinator
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the poll loop until [`stop`](Self::stop) is called.
    ///
    /// The first cycle runs immediately.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Poll scheduler already running");
            return;
        }
        let _running = RunningGuard(&self.running);
        info!("Starting poll scheduler every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failure is recorded on the coordinator
                    let _ = self.coordinator.refresh().await;
                }
                _ = self.shutdown.notified() => {
                    info!("Poll scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Stop the poll loop. No effect when it is not running.
    pub fn stop(&self) {
        if !self.is_running() {
            debug!("Poll scheduler not running");
            return;
        }
        debug!("Stopping poll scheduler");
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Clears the running flag when the poll loop ends or its future is dropped
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquirer::tests::{Scripted, ScriptedTransport};
    use crate::status::OcppStatus;
    use std::sync::atomic::Ordering;

    fn coordinator(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, Arc<Coordinator<ScriptedTransport>>) {
        let transport = Arc::new(transport);
        let coordinator = Arc::new(Coordinator::new(SnapshotAcquirer::new(transport.clone())));
        (transport, coordinator)
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let (_, coordinator) = coordinator(ScriptedTransport::healthy());
        assert!(coordinator.latest().is_none());

        let mut rx = coordinator.subscribe();
        let snapshot = coordinator.refresh().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let published = rx.borrow_and_update().clone().unwrap();
        assert!(Arc::ptr_eq(&snapshot, &published));
        assert!(coordinator.last_update_success());
        assert!(coordinator.last_error().is_none());
        assert!(coordinator.last_report().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_failed_status_keeps_previous_snapshot() {
        let (transport, coordinator) = coordinator(ScriptedTransport::healthy());
        let first = coordinator.refresh().await.unwrap();
        assert_eq!(first.ocpp_status(), OcppStatus::Charging);

        transport.script(104, Scripted::Exception);
        transport.script(122, Scripted::Words(vec![5]));
        assert!(coordinator.refresh().await.is_err());

        let latest = coordinator.latest().unwrap();
        assert!(Arc::ptr_eq(&first, &latest));
        assert_eq!(latest.vehicle_state, 3);
        assert!(!coordinator.last_update_success());
        assert!(coordinator.last_error().unwrap().contains("register 104"));
    }

    #[tokio::test]
    async fn test_each_cycle_replaces_snapshot_wholesale() {
        let (transport, coordinator) = coordinator(ScriptedTransport::healthy());
        coordinator.refresh().await.unwrap();

        transport.script(206, Scripted::Exception);
        let second = coordinator.refresh().await.unwrap();

        // No carry-over of meter values from the first cycle
        assert_eq!(second.power, 0);
        assert_eq!(second.voltage_l1, 0);
        assert!(coordinator.last_update_success());
    }

    #[tokio::test]
    async fn test_shutdown_closes_once() {
        let (transport, coordinator) = coordinator(ScriptedTransport::healthy());
        coordinator.refresh().await.unwrap();

        coordinator.shutdown().await.unwrap();
        coordinator.shutdown().await.unwrap();
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_polls_until_stopped() {
        let (transport, coordinator) = coordinator(ScriptedTransport::healthy());
        let scheduler = Arc::new(PollScheduler::new(coordinator.clone(), Duration::from_secs(10)));

        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start().await })
        };

        // First tick is immediate
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(scheduler.is_running());
        assert!(coordinator.latest().is_some());

        tokio::time::sleep(Duration::from_secs(25)).await;
        let polls = transport
            .read_starts()
            .iter()
            .filter(|&&start| start == 104)
            .count();
        assert_eq!(polls, 3);

        scheduler.stop();
        runner.await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_does_not_cancel_next_start() {
        let (transport, coordinator) = coordinator(ScriptedTransport::healthy());
        let scheduler = Arc::new(PollScheduler::new(coordinator, Duration::from_secs(10)));

        scheduler.stop();

        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start().await })
        };
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(scheduler.is_running());
        let polls = transport
            .read_starts()
            .iter()
            .filter(|&&start| start == 104)
            .count();
        assert_eq!(polls, 2);

        scheduler.stop();
        runner.await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_loop_clears_running() {
        let (_, coordinator) = coordinator(ScriptedTransport::healthy());
        let scheduler = PollScheduler::new(coordinator, Duration::from_secs(10));

        let cancelled = tokio::time::timeout(Duration::from_secs(5), scheduler.start()).await;
        assert!(cancelled.is_err());
        assert!(!scheduler.is_running());

        // Can be started again afterwards
        let cancelled = tokio::time::timeout(Duration::from_secs(5), scheduler.start()).await;
        assert!(cancelled.is_err());
        assert!(scheduler.coordinator().latest().is_some());
    }
}
