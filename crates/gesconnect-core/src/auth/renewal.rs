//! Proactive, timer-driven token renewal.
//!
//! The loop knows nothing about tokens: each tick runs a caller-supplied
//! future, and the loop ends when that future returns `false`. Only one
//! loop runs per [`RenewalLoop`]; starting again replaces the old timer.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Shortest accepted period; tokio intervals reject zero.
pub const MIN_RENEWAL_PERIOD: Duration = Duration::from_secs(1);

pub struct RenewalLoop {
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalLoop {
    /// Periods below [`MIN_RENEWAL_PERIOD`] are raised to it.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_RENEWAL_PERIOD),
            handle: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking every period, cancelling any loop already running.
    /// The first tick fires one full period after the call.
    ///
    /// Returns `true` if a running loop was replaced. Must be called from
    /// within a tokio runtime.
    pub fn start<F, Fut>(&self, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = self.period;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("Renewal loop finished");
                        break;
                    }
                    Err(_) => error!("Renewal tick panicked, continuing"),
                }
            }
        });

        let replaced = match self.slot().replace(task) {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        };
        debug!(period_secs = period.as_secs(), replaced, "Renewal loop started");
        replaced
    }

    /// Cancel the running loop. Returns `true` if one was cancelled.
    pub fn stop(&self) -> bool {
        match self.slot().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                debug!("Renewal loop stopped");
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RenewalLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_timer() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let renewal = RenewalLoop::new(Duration::from_secs(60));

        for expected_replaced in [false, true] {
            let ticks = Arc::clone(&ticks);
            let replaced = renewal.start(move || {
                let ticks = Arc::clone(&ticks);
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    true
                }
            });
            assert_eq!(replaced, expected_replaced);
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        assert!(renewal.stop());
        assert!(!renewal.stop());
        assert!(!renewal.is_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let renewal = RenewalLoop::new(Duration::from_secs(10));

        let counter = Arc::clone(&ticks);
        renewal.start(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }
        });
        assert!(renewal.is_running());

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!renewal.is_running());
        assert!(!renewal.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_kill_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let renewal = RenewalLoop::new(Duration::from_secs(10));

        let counter = Arc::clone(&ticks);
        renewal.start(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first renewal blew up");
                }
                true
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(renewal.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let renewal = RenewalLoop::new(Duration::ZERO);
        assert_eq!(renewal.period(), MIN_RENEWAL_PERIOD);

        let counter = Arc::clone(&ticks);
        renewal.start(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(renewal.is_running());
        renewal.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let renewal = RenewalLoop::new(Duration::from_secs(5));
            let counter = Arc::clone(&ticks);
            renewal.start(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
