//! Periodic task runner with linear backoff on failure.
//!
//! Success sleeps for the base interval and clears accumulated backoff.
//! A failure sleeps `min(ceiling, interval + accumulated)` and then adds one
//! step, so the first failure after a success waits the base interval.

use std::future::Future;
use std::time::Duration;

use aurora_core::QuoteSettings;
use tokio::sync::watch;
use tracing::debug;

/// Timing parameters for a periodic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
    pub step: Duration,
}

impl BackoffPolicy {
    pub fn new(interval: Duration, ceiling: Duration, step: Duration) -> Self {
        Self {
            interval,
            ceiling,
            step,
        }
    }
}

impl From<&QuoteSettings> for BackoffPolicy {
    fn from(settings: &QuoteSettings) -> Self {
        Self::new(
            settings.refresh_interval,
            settings.backoff_ceiling,
            settings.backoff_step,
        )
    }
}

/// Backoff state for one loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    accumulated: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            accumulated: Duration::ZERO,
        }
    }

    /// Accumulated backoff beyond the base interval.
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    /// Record a success and return the delay before the next run.
    pub fn on_success(&mut self) -> Duration {
        self.accumulated = Duration::ZERO;
        self.policy.interval
    }

    /// Record a failure and return the delay before the next run.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self
            .policy
            .ceiling
            .min(self.policy.interval + self.accumulated);
        // Stop growing once the ceiling is reached.
        if self.policy.interval + self.accumulated < self.policy.ceiling {
            self.accumulated += self.policy.step;
        }
        delay
    }
}

/// Run `task` until `stop` flips to `true` (or its sender is dropped).
///
/// Failures are handed to `on_failure` together with the delay before the
/// next attempt and never end the loop. The stop signal is checked before
/// every run and before every sleep, and interrupts a sleep in progress.
pub async fn run_periodic<T, E, Task, Fut, OnSuccess, OnFailure>(
    policy: BackoffPolicy,
    mut stop: watch::Receiver<bool>,
    mut task: Task,
    mut on_success: OnSuccess,
    mut on_failure: OnFailure,
) where
    Task: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnSuccess: FnMut(T),
    OnFailure: FnMut(E, Duration),
{
    let mut backoff = Backoff::new(policy);

    loop {
        if *stop.borrow() {
            break;
        }

        let delay = match task().await {
            Ok(value) => {
                let delay = backoff.on_success();
                on_success(value);
                delay
            }
            Err(e) => {
                let delay = backoff.on_failure();
                on_failure(e, delay);
                delay
            }
        };

        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Periodic loop stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(10),
            Duration::from_secs(22),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_linear_growth_capped_at_ceiling() {
        let mut backoff = Backoff::new(policy());
        assert_eq!(backoff.on_failure(), Duration::from_secs(10));
        assert_eq!(backoff.on_failure(), Duration::from_secs(15));
        assert_eq!(backoff.on_failure(), Duration::from_secs(20));
        assert_eq!(backoff.on_failure(), Duration::from_secs(22));
        assert_eq!(backoff.on_failure(), Duration::from_secs(22));
        assert_eq!(backoff.accumulated(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_quote_policy_delays() {
        let mut backoff = Backoff::new(BackoffPolicy::from(&QuoteSettings::default()));
        let delays: Vec<u64> = (0..6).map(|_| backoff.on_failure().as_secs()).collect();
        assert_eq!(delays, vec![60, 75, 90, 105, 120, 120]);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut backoff = Backoff::new(policy());
        backoff.on_failure();
        backoff.on_failure();
        assert_eq!(backoff.on_success(), Duration::from_secs(10));
        assert_eq!(backoff.accumulated(), Duration::ZERO);
        assert_eq!(backoff.on_failure(), Duration::from_secs(10));
        assert_eq!(backoff.on_failure(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_periodic_sleeps_follow_policy() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let task_calls = calls.clone();
        let task_stop = stop_tx.clone();
        let task = move || {
            let calls = task_calls.clone();
            let stop = task_stop.clone();
            async move {
                let n = {
                    let mut calls = calls.lock();
                    calls.push(Instant::now());
                    calls.len()
                };
                if n == 5 {
                    let _ = stop.send(true);
                }
                if n <= 3 {
                    Err(format!("failure {}", n))
                } else {
                    Ok(n)
                }
            }
        };

        let ok = successes.clone();
        let failed = failures.clone();
        run_periodic(
            policy(),
            stop_rx,
            task,
            move |_| {
                ok.fetch_add(1, Ordering::SeqCst);
            },
            move |e: String, delay| failed.lock().push((e, delay)),
        )
        .await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 5);
        let gaps: Vec<u64> = calls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![10, 15, 20, 10]);
        assert_eq!(successes.load(Ordering::SeqCst), 2);
        assert_eq!(failures.lock().len(), 3);
        assert_eq!(failures.lock()[0].0, "failure 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleep() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let runs = Arc::new(AtomicUsize::new(0));
        let task_runs = runs.clone();

        let handle = tokio::spawn(run_periodic(
            BackoffPolicy::new(
                Duration::from_secs(3600),
                Duration::from_secs(3600),
                Duration::from_secs(60),
            ),
            stop_rx,
            move || {
                let runs = task_runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            },
            |_| {},
            |_, _| {},
        ));

        let start = Instant::now();
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_loop() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_periodic(
            policy(),
            stop_rx,
            || async { Err::<(), _>("down") },
            |_| {},
            |_, _| {},
        ));
        drop(stop_tx);
        handle.await.unwrap();
    }
}
