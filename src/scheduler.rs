//! The recurring flush schedule.
//!
//! One background task fires the flush routine on the configured cadence.
//! The period comes from the settings service over a watch channel; an
//! interval change tears the current timer down and rebuilds it, which is
//! the only way a new period takes effect. A rebuilt timer fires
//! immediately, matching activation's first-fire-now behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::gauge;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::flush::{Flusher, RequestContext};
use crate::lock::mutex_lock;

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unscheduled,
    Scheduled { period: Duration },
}

pub struct FlushScheduler {
    flusher: Arc<Flusher>,
    period_rx: watch::Receiver<Duration>,
    state: Arc<Mutex<SchedulerState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    pub fn new(flusher: Arc<Flusher>, period_rx: watch::Receiver<Duration>) -> Self {
        Self {
            flusher,
            period_rx,
            state: Arc::new(Mutex::new(SchedulerState::Unscheduled)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *mutex_lock(&self.state, "state")
    }

    /// Ensure the recurring flush task exists.
    ///
    /// A no-op while already scheduled, so exactly one task runs at any
    /// time. The first fire happens immediately.
    pub fn activate(&self) {
        let mut task = mutex_lock(&self.task, "activate");
        if task.is_some() {
            debug!("Flush schedule already active");
            return;
        }

        let period = *self.period_rx.borrow();
        *mutex_lock(&self.state, "activate") = SchedulerState::Scheduled { period };
        gauge!("permaflush_scheduler_period_seconds").set(period.as_secs_f64());
        info!(period_secs = period.as_secs(), "Flush schedule activated");

        let flusher = self.flusher.clone();
        let mut period_rx = self.period_rx.clone();
        let state = self.state.clone();
        *task = Some(tokio::spawn(async move {
            let mut period = period;
            let mut timer = tokio::time::interval(period);
            let mut watch_open = true;
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let mut ctx = RequestContext::new();
                        flusher.flush(&mut ctx).await;
                    }
                    changed = period_rx.changed(), if watch_open => {
                        if changed.is_err() {
                            // Settings service gone; no reschedule can ever
                            // arrive, keep the current cadence.
                            watch_open = false;
                            continue;
                        }
                        period = *period_rx.borrow_and_update();
                        timer = tokio::time::interval(period);
                        *mutex_lock(&state, "reschedule") =
                            SchedulerState::Scheduled { period };
                        gauge!("permaflush_scheduler_period_seconds")
                            .set(period.as_secs_f64());
                        info!(period_secs = period.as_secs(), "Flush schedule rebuilt");
                    }
                }
            }
        }));
    }

    /// Remove the recurring flush task.
    pub fn deactivate(&self) {
        let mut task = mutex_lock(&self.task, "deactivate");
        if let Some(handle) = task.take() {
            handle.abort();
            *mutex_lock(&self.state, "deactivate") = SchedulerState::Unscheduled;
            gauge!("permaflush_scheduler_period_seconds").set(0.0);
            info!("Flush schedule removed");
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::flush::{RewriteError, RewriteRules};

    struct CountingRules {
        calls: AtomicUsize,
    }

    impl CountingRules {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RewriteRules for CountingRules {
        async fn recompute(&self) -> Result<(), RewriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler_with_period(
        period: Duration,
    ) -> (FlushScheduler, Arc<CountingRules>, watch::Sender<Duration>) {
        let rules = CountingRules::new();
        let flusher = Arc::new(Flusher::new(rules.clone()));
        let (tx, rx) = watch::channel(period);
        (FlushScheduler::new(flusher, rx), rules, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn activation_fires_immediately_then_on_period() {
        let (scheduler, rules, _tx) = scheduler_with_period(Duration::from_secs(300));

        assert_eq!(scheduler.state(), SchedulerState::Unscheduled);
        scheduler.activate();
        assert_eq!(
            scheduler.state(),
            SchedulerState::Scheduled {
                period: Duration::from_secs(300)
            }
        );

        // First fire is immediate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rules.calls(), 1);

        // One more fire per elapsed period.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(rules.calls(), 2);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rules.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn double_activation_keeps_a_single_task() {
        let (scheduler, rules, _tx) = scheduler_with_period(Duration::from_secs(60));

        scheduler.activate();
        scheduler.activate();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rules.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rules.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_rebuilds_the_timer() {
        let (scheduler, rules, tx) = scheduler_with_period(Duration::from_secs(300));
        scheduler.activate();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rules.calls(), 1);

        tx.send(Duration::from_secs(60)).unwrap();
        // The rebuilt timer fires immediately, like activation does.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rules.calls(), 2);
        assert_eq!(
            scheduler.state(),
            SchedulerState::Scheduled {
                period: Duration::from_secs(60)
            }
        );

        // Old 300s cadence is gone; the 60s cadence is in effect.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(rules.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivation_stops_firing() {
        let (scheduler, rules, _tx) = scheduler_with_period(Duration::from_secs(60));
        scheduler.activate();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rules.calls(), 1);

        scheduler.deactivate();
        assert_eq!(scheduler.state(), SchedulerState::Unscheduled);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rules.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_fire_uses_a_fresh_request_context() {
        let (scheduler, rules, _tx) = scheduler_with_period(Duration::from_secs(60));
        scheduler.activate();

        tokio::time::sleep(Duration::from_secs(121)).await;
        // Three fires (immediate + two periods), each flushing once.
        assert_eq!(rules.calls(), 3);
    }
}
