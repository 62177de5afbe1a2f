// src/bootstrap.rs

//! Resilient process bootstrap and shutdown supervision.
//!
//! Services must come up cleanly while the broker (or a backing store) is
//! still starting, so every external connection goes through
//! [`connect_with_retry`]: a bounded number of attempts with a fixed delay
//! between failures. All connect failures are treated uniformly as
//! retryable — the only expected failure mode during startup is "broker not
//! yet accepting connections". The wait between attempts is cancellable so
//! an early interrupt aborts the bootstrap immediately.
//!
//! Exhausting all attempts returns the *last* observed error. The decision
//! to terminate the process stays with the caller (the service binaries);
//! this module never exits on its own.

use crate::{log_info, log_warn, Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Bounded fixed-delay retry policy for bootstrap connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of connect attempts (not retries); at least 1.
    pub max_attempts: u32,

    /// Delay between failed attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Matches the deployment default: ten attempts, five seconds apart,
    /// enough to ride out a broker container restart.
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Attempt a connection up to `policy.max_attempts` times.
///
/// Each failure is logged with the attempt index and cause, then the loop
/// sleeps `policy.delay` before the next attempt. If `shutdown` fires during
/// the sleep, the bootstrap aborts with [`Error::Canceled`] rather than the
/// last connect error. Exhaustion returns the last error; callers treat
/// that as fatal for the process.
///
/// Generic over the connector so the same shape serves the broker and any
/// backing-store bootstrap.
pub async fn connect_with_retry<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // ---
    let mut last_err = Error::Transport(format!("{what}: no connect attempts made"));

    for attempt in 1..=policy.max_attempts.max(1) {
        match connect().await {
            Ok(conn) => {
                log_info!("connected to {what} on attempt {attempt}");
                return Ok(conn);
            }
            Err(err) => {
                log_warn!(
                    "{what} connection attempt {attempt}/{} failed: {err}",
                    policy.max_attempts
                );
                last_err = err;
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                _ = shutdown.cancelled() => return Err(Error::Canceled),
            }
        }
    }

    Err(last_err)
}

/// Process-wide shutdown supervisor.
///
/// Wraps a [`CancellationToken`] shared by every task in the process and a
/// [`TaskTracker`] for the tasks that must drain before exit. Constructed
/// once during bootstrap, passed by handle into every component that needs
/// it; there is no ambient global.
#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        // ---
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// The shared cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for tasks that participate in the graceful drain.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Cancel all tasks observing the token.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Install a ctrl-c listener that cancels the shared token.
    pub fn listen_for_interrupt(&self) {
        // ---
        let token = self.token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log_info!("interrupt received, shutting down");
                token.cancel();
            }
        });
    }

    /// Wait for cancellation, then let tracked tasks drain within `grace`.
    ///
    /// Returns `true` when every tracked task finished inside the grace
    /// period, `false` when the drain was cut short.
    pub async fn drain(&self, grace: Duration) -> bool {
        // ---
        self.token.cancelled().await;
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                log_warn!("graceful drain exceeded {grace:?}, forcing shutdown");
                false
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn counting_connector(
        fail_first: u32,
    ) -> (
        Arc<Mutex<u32>>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>,
    ) {
        // ---
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();

        let connect = move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                let mut c = calls.lock().unwrap();
                *c += 1;
                let attempt = *c;
                drop(c);

                if attempt <= fail_first {
                    Err(Error::Transport("broker not ready".into()))
                } else {
                    Ok(attempt)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>
        };

        (calls, connect)
    }

    #[tokio::test]
    async fn test_succeeds_after_k_failures() {
        // ---
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(10),
        };
        let token = CancellationToken::new();
        let (calls, connect) = counting_connector(2);

        let start = Instant::now();
        let result = connect_with_retry("broker", &policy, &token, connect).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(*calls.lock().unwrap(), 3);
        // Two waits of 10ms, generous upper bound for scheduling noise.
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        // ---
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
        };
        let token = CancellationToken::new();
        let (calls, connect) = counting_connector(u32::MAX);

        let result: Result<u32> = connect_with_retry("broker", &policy, &token, connect).await;

        assert!(matches!(result, Err(Error::Transport(_))));
        // Exactly max_attempts attempts, no more and no fewer.
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_during_wait_aborts() {
        // ---
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(30),
        };
        let token = CancellationToken::new();
        let (calls, connect) = counting_connector(u32::MAX);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result: Result<u32> = connect_with_retry("broker", &policy, &token, connect).await;

        assert!(matches!(result, Err(Error::Canceled)));
        // Attempt 2 never ran.
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_waiting() {
        // ---
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        };
        let token = CancellationToken::new();
        let (calls, connect) = counting_connector(0);

        let start = Instant::now();
        let result = connect_with_retry("store", &policy, &token, connect).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_drain_waits_for_tracked_tasks() {
        // ---
        let shutdown = Shutdown::new();
        let flag = Arc::new(Mutex::new(false));

        let flag_clone = flag.clone();
        let token = shutdown.token();
        shutdown.tracker().spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            *flag_clone.lock().unwrap() = true;
        });

        shutdown.trigger();
        let clean = shutdown.drain(Duration::from_secs(1)).await;

        assert!(clean);
        assert!(*flag.lock().unwrap());
    }
}
