//! Client liveness: the status state machine, event handling and the
//! scheduled timeout sweep.

mod state;
mod tracker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ratelimit::RateLimiter;

pub use state::{
    BOOTING_TIMEOUT_SECS, LivenessEvent, ONLINE_TIMEOUT_SECS, sweep_target, transition,
};
pub use tracker::{LivenessTracker, SweepSummary};

/// Run one sweep, giving up after `budget`. Failures are logged, not raised.
pub async fn run_sweep(tracker: &LivenessTracker, budget: Duration) -> Option<SweepSummary> {
    match tokio::time::timeout(budget, tracker.sweep()).await {
        Ok(Ok(summary)) => {
            if summary.demoted > 0 || summary.raced > 0 {
                info!(
                    examined = summary.examined,
                    demoted = summary.demoted,
                    raced = summary.raced,
                    "Status sweep completed"
                );
            }
            Some(summary)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Status sweep failed");
            None
        }
        Err(_) => {
            warn!(budget_ms = budget.as_millis(), "Status sweep timed out");
            None
        }
    }
}

/// Spawn the background task that sweeps every `every` and prunes idle
/// rate-limit keys on the same tick.
pub fn spawn_sweeper(
    tracker: LivenessTracker,
    limiters: Vec<Arc<RateLimiter>>,
    every: Duration,
    budget: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_sweep(&tracker, budget).await;

            let mut pruned = 0;
            for limiter in &limiters {
                pruned += limiter.prune().await;
            }
            if pruned > 0 {
                debug!(pruned, "Idle rate-limit keys pruned");
            }
        }
    })
}
