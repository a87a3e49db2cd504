//! Periodic progress reporting for a resolve pass.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default reporting interval.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Point-in-time view of a resolve pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Dependencies finished, successfully or not.
    pub completed: usize,
    /// Dependencies in the pass.
    pub total: usize,
    /// Time since the pass started.
    pub elapsed: Duration,
    /// Estimated time remaining, `None` until something has completed.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Build a snapshot, estimating the remaining time as
    /// `elapsed / completed * remaining`.
    #[must_use]
    pub fn new(completed: usize, total: usize, elapsed: Duration) -> Self {
        let remaining = total.saturating_sub(completed);
        let eta = u32::try_from(completed)
            .ok()
            .filter(|&c| c > 0)
            .and_then(|c| elapsed.checked_div(c))
            .and_then(|per_item| {
                u32::try_from(remaining)
                    .ok()
                    .and_then(|r| per_item.checked_mul(r))
            });
        Self {
            completed,
            total,
            elapsed,
            eta,
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} dependencies, ETA ", self.completed, self.total)?;
        match self.eta {
            Some(eta) => write!(f, "{:.1}s", eta.as_secs_f64()),
            None => f.write_str("unknown"),
        }
    }
}

/// Logs progress at a fixed interval until cancelled.
#[derive(Debug)]
pub struct ProgressNotifier {
    total: usize,
    completed: Arc<AtomicUsize>,
    interval: Duration,
    started: Instant,
}

impl ProgressNotifier {
    /// Track `completed` out of `total`, starting the clock now.
    #[must_use]
    pub fn new(total: usize, completed: Arc<AtomicUsize>, interval: Duration) -> Self {
        Self {
            total,
            completed,
            interval,
            started: Instant::now(),
        }
    }

    /// Current progress.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(
            self.completed.load(Ordering::Relaxed),
            self.total,
            self.started.elapsed(),
        )
    }

    /// Report on a background task until `cancel` fires.
    ///
    /// The first report is emitted one interval after starting.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                Instant::now().checked_add(self.interval).unwrap_or_else(Instant::now),
                self.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = self.snapshot();
                        info!(
                            completed = snapshot.completed,
                            total = snapshot.total,
                            "Resolving dependencies: {snapshot}"
                        );
                    }
                }
            }
        })
    }
}
