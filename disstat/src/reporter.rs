//! Periodic background reporting
//!
//! A [`ReportingLoop`] owns at most one tokio task. While running, the task waits
//! for the host to become ready and then reports once per interval until the host
//! closes, the loop is stopped, or the reporting target is dropped. Failed reports
//! go to the target's error hook and never end the loop.

use crate::error::{DisstatError, Result};
use crate::host::BotHost;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback receiving errors from autonomous report ticks
pub type ErrorHook = Arc<dyn Fn(&DisstatError) + Send + Sync>;

/// Default hook: log the failure and carry on
pub fn log_error_hook() -> ErrorHook {
    Arc::new(|err: &DisstatError| {
        error!(error = %err, status = ?err.status_code(), "Failed to post bot statistics");
    })
}

/// What the loop drives on every tick
#[async_trait]
pub trait ReportTarget: Send + Sync {
    /// The host bot whose readiness and lifetime gate the loop
    fn host(&self) -> Arc<dyn BotHost>;

    async fn report(&self) -> Result<()>;

    fn on_error(&self, err: &DisstatError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

struct RunningLoop {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Tasks {
    active: Option<RunningLoop>,
    /// A stopped task that may still be finishing its last tick
    stopping: Option<JoinHandle<()>>,
}

/// Cancellable periodic reporting task
pub struct ReportingLoop {
    interval: Duration,
    tasks: Mutex<Tasks>,
}

impl ReportingLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> LoopState {
        if self.is_running() {
            LoopState::Running
        } else {
            LoopState::Stopped
        }
    }

    /// True while a started task has neither been stopped nor finished
    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .active
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the reporting task. Does nothing if one is already running.
    ///
    /// If a previously stopped task is still finishing a tick, the new task
    /// starts reporting only after it has ended. Must be called from within a
    /// tokio runtime. Returns whether a task was spawned.
    pub fn start<T>(&self, target: Weak<T>) -> bool
    where
        T: ReportTarget + 'static,
    {
        let mut tasks = self.tasks.lock();
        if let Some(current) = tasks.active.as_ref() {
            if !current.handle.is_finished() {
                debug!("Reporting loop already running");
                return false;
            }
        }

        let previous = tasks.stopping.take().filter(|handle| !handle.is_finished());
        let (stop_tx, stop_rx) = watch::channel(false);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                debug!("Waiting for the previous reporting task to finish");
                let _ = previous.await;
            }
            run_loop(target, interval, stop_rx).await;
        });
        tasks.active = Some(RunningLoop { handle, stop_tx });

        info!(interval_secs = interval.as_secs(), "Reporting loop started");
        true
    }

    /// Signal the task to stop at its next sleep boundary.
    ///
    /// A tick already in flight completes first, so drained data is either sent or
    /// restored. Stopping a stopped loop only logs a warning.
    pub fn stop(&self) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.active.take() {
            Some(running) if !running.handle.is_finished() => {
                let _ = running.stop_tx.send(true);
                tasks.stopping = Some(running.handle);
                info!("Reporting loop stopped");
                true
            }
            _ => {
                warn!("Disstat loop is not running");
                false
            }
        }
    }
}

impl Drop for ReportingLoop {
    fn drop(&mut self) {
        if let Some(running) = self.tasks.get_mut().active.take() {
            let _ = running.stop_tx.send(true);
        }
    }
}

async fn run_loop<T>(target: Weak<T>, interval: Duration, mut stop_rx: watch::Receiver<bool>)
where
    T: ReportTarget + 'static,
{
    if *stop_rx.borrow() {
        return;
    }

    // Only the host is held while waiting, so the target can still be dropped
    let Some(host) = target.upgrade().map(|target| target.host()) else {
        return;
    };
    tokio::select! {
        _ = host.wait_until_ready() => {}
        _ = stop_rx.changed() => return,
    }

    loop {
        if *stop_rx.borrow() {
            break;
        }
        if host.is_closed() {
            info!("Host closed, ending reporting loop");
            break;
        }

        {
            let Some(target) = target.upgrade() else {
                debug!("Reporting target dropped, ending loop");
                break;
            };

            match target.report().await {
                Ok(()) => debug!("Report tick completed"),
                Err(e) => {
                    debug!("Report tick failed: {}", e);
                    target.on_error(&e);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestHost {
        ready: bool,
        closed: AtomicBool,
    }

    impl TestHost {
        fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                ready,
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl BotHost for TestHost {
        fn current_user_id(&self) -> Option<u64> {
            Some(1)
        }
        fn shard_count(&self) -> Option<u32> {
            None
        }
        fn user_count(&self) -> u32 {
            0
        }
        fn guild_count(&self) -> u32 {
            0
        }
        fn all_members_count(&self) -> u32 {
            0
        }
        fn api_latency(&self) -> Option<Duration> {
            None
        }
        async fn wait_until_ready(&self) {
            if !self.ready {
                std::future::pending::<()>().await;
            }
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct CountingTarget {
        host: Arc<TestHost>,
        reports: AtomicUsize,
        errors: AtomicUsize,
        fail: AtomicBool,
        /// How long each report takes
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingTarget {
        fn new() -> Arc<Self> {
            Self::with_host(TestHost::new(true), Duration::ZERO)
        }

        fn with_host(host: Arc<TestHost>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                host,
                reports: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReportTarget for CountingTarget {
        fn host(&self) -> Arc<dyn BotHost> {
            self.host.clone()
        }

        async fn report(&self) -> Result<()> {
            self.reports.fetch_add(1, Ordering::SeqCst);
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(DisstatError::api("Disstat posting stat failed", 500));
            }
            Ok(())
        }

        fn on_error(&self, _err: &DisstatError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_interval() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        assert!(reporting.start(Arc::downgrade(&target)));
        tokio::time::sleep(Duration::from_secs(150)).await;

        // Ticks at 0s, 60s and 120s
        assert_eq!(target.reports.load(Ordering::SeqCst), 3);
        assert!(reporting.stop());
    }

    #[tokio::test]
    async fn test_start_twice_spawns_one_task() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        assert!(reporting.start(Arc::downgrade(&target)));
        assert!(!reporting.start(Arc::downgrade(&target)));
        assert_eq!(reporting.state(), LoopState::Running);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.reports.load(Ordering::SeqCst), 1);
        reporting.stop();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_only_warns() {
        let reporting = ReportingLoop::new(Duration::from_secs(60));
        assert!(!reporting.stop());
        assert_eq!(reporting.state(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_end_loop() {
        let target = CountingTarget::new();
        target.fail.store(true, Ordering::SeqCst);
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(130)).await;

        assert_eq!(target.reports.load(Ordering::SeqCst), 3);
        assert_eq!(target.errors.load(Ordering::SeqCst), 3);
        assert!(reporting.is_running());
        reporting.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_task_at_sleep_boundary() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(1)).await;
        reporting.stop();
        assert_eq!(reporting.state(), LoopState::Stopped);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.reports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_host_ends_loop() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(1)).await;
        target.host.closed.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(target.reports.load(Ordering::SeqCst), 1);
        assert!(!reporting.is_running());

        // A finished task can be replaced
        target.host.closed.store(false, Ordering::SeqCst);
        assert!(reporting.start(Arc::downgrade(&target)));
        reporting.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_host_closed_only_warns() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(1)).await;
        target.host.closed.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(reporting.state(), LoopState::Stopped);
        assert!(!reporting.stop());
        assert!(!reporting.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_tick_never_overlaps() {
        let target = CountingTarget::with_host(TestHost::new(true), Duration::from_secs(5));
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        assert!(reporting.start(Arc::downgrade(&target)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(reporting.stop());
        assert!(reporting.start(Arc::downgrade(&target)));
        assert_eq!(reporting.state(), LoopState::Running);

        // The first tick ends at 5s; the restarted task ticks from 5s to 10s
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(target.reports.load(Ordering::SeqCst), 2);
        assert_eq!(target.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(reporting.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop_during_previous_tick_skips_reporting() {
        let target = CountingTarget::with_host(TestHost::new(true), Duration::from_secs(5));
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(1)).await;
        reporting.stop();
        reporting.start(Arc::downgrade(&target));
        reporting.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(target.reports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_target_ends_loop() {
        let target = CountingTarget::new();
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(Arc::downgrade(&target));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(target);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!reporting.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_wait_does_not_keep_target_alive() {
        let target = CountingTarget::with_host(TestHost::new(false), Duration::ZERO);
        let weak = Arc::downgrade(&target);
        let reporting = ReportingLoop::new(Duration::from_secs(60));

        reporting.start(weak.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(target);
        assert!(weak.upgrade().is_none());

        assert!(reporting.stop());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!reporting.is_running());
    }
}
