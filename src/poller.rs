use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

use crate::aggregator::LineBuffer;
use crate::orchestrator::Orchestrator;

/// How many short retries a deferred tick gets before it is skipped.
const DEFER_RETRIES: u32 = 3;
const DEFER_BACKOFF: Duration = Duration::from_millis(25);

/// Two-state polling machine: DISABLED (initial) and ENABLED. `SENSORS`
/// enables, `STOP` disables; `STOP` takes effect on or before the next
/// scheduled tick, an in-flight transaction is allowed to complete.
#[derive(Debug, Clone, Copy)]
pub struct PollState {
    enabled: bool,
    interval: Duration,
    last_poll: Option<Instant>,
}

impl PollState {
    pub fn new(interval: Duration) -> Self {
        Self {
            enabled: false,
            interval,
            last_poll: None,
        }
    }

    /// Returns true when this call transitioned DISABLED → ENABLED.
    pub fn enable(&mut self) -> bool {
        !core::mem::replace(&mut self.enabled, true)
    }

    /// Returns true when this call transitioned ENABLED → DISABLED.
    /// Disabling an already-disabled poller is a no-op.
    pub fn disable(&mut self) -> bool {
        core::mem::replace(&mut self.enabled, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mark_polled(&mut self, now: Instant) {
        self.last_poll = Some(now);
    }

    pub fn last_poll(&self) -> Option<Instant> {
        self.last_poll
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PollStats {
    /// Ticks that issued a bus transaction.
    pub ticks: u32,
    /// Reports delivered to the operator channel.
    pub reports: u32,
    /// Ticks deferred because the bus was busy with an operator command.
    pub deferred: u32,
    /// Ticks dropped after an error (timeout, bad frame); polling continues.
    pub skipped: u32,
}

/// Outcome of one poll tick attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Disabled,
    /// The bus was busy; try again shortly.
    Deferred,
    /// The transaction ran but produced no report; already logged.
    Skipped,
    Report(LineBuffer),
}

/// Periodic polling task. Each interval elapse attempts one sensor read and
/// broadcasts the formatted report line to the operator channel. A busy bus
/// defers the tick to the next free slot; per-tick errors are swallowed so a
/// flaky peer cannot halt polling.
pub async fn run(master: Arc<Orchestrator>, reports: broadcast::Sender<String>) {
    let mut ticker = time::interval(master.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut retries = 0;
        loop {
            match master.poll_tick().await {
                PollOutcome::Report(line) => {
                    let _ = reports.send(line.as_str().to_string());
                    break;
                }
                PollOutcome::Deferred if retries < DEFER_RETRIES => {
                    retries += 1;
                    time::sleep(DEFER_BACKOFF).await;
                }
                PollOutcome::Deferred => {
                    warn!("poll tick deferred past retry budget, waiting for next interval");
                    break;
                }
                PollOutcome::Disabled | PollOutcome::Skipped => break,
            }
        }
    }
}
