// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Background reconciliation task
//!
//! Runs a reconciliation pass on a fixed period until shut down. A pass
//! that panics is logged and the task keeps running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Something that can run one reconciliation pass.
pub trait Reconcile: Send + Sync + 'static {
    /// Run one pass and return the number of sessions expired.
    fn reconcile_pass(&self) -> usize;
}

/// Handle to a running reconciler. Dropping it leaves the task running
/// until the runtime shuts down; call [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<u64>,
}

impl ReconcilerHandle {
    /// Stop the task and wait for it. Returns the number of passes run.
    pub async fn shutdown(mut self) -> u64 {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match (&mut self.join).await {
            Ok(passes) => passes,
            Err(e) => {
                error!("Reconciler task failed: {}", e);
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn the periodic reconciler on the current tokio runtime.
///
/// The first pass runs one `period` after spawning.
pub fn spawn_reconciler<R: Reconcile>(target: Arc<R>, period: Duration) -> ReconcilerHandle {
    let period = period.max(Duration::from_millis(1));
    let (tx, mut rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    passes += 1;
                    match catch_unwind(AssertUnwindSafe(|| target.reconcile_pass())) {
                        Ok(expired) => debug!(pass = passes, expired, "reconciliation pass complete"),
                        Err(_) => error!(pass = passes, "reconciliation pass panicked"),
                    }
                }
                _ = &mut rx => {
                    debug!(passes, "reconciler shutting down");
                    break;
                }
            }
        }
        passes
    });

    ReconcilerHandle {
        shutdown: Some(tx),
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
    }

    impl Reconcile for Counting {
        fn reconcile_pass(&self) -> usize {
            self.runs.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    struct Exploding;

    impl Reconcile for Exploding {
        fn reconcile_pass(&self) -> usize {
            panic!("sweep failed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval() {
        let target = Arc::new(Counting::default());
        let handle = spawn_reconciler(Arc::clone(&target), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(target.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(target.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(target.runs.load(Ordering::SeqCst), 3);

        let passes = handle.shutdown().await;
        assert_eq!(passes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_survives_panicking_pass() {
        let handle = spawn_reconciler(Arc::new(Exploding), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!handle.is_finished());
        assert_eq!(handle.shutdown().await, 3);
    }
}
