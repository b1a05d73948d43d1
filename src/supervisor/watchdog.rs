//! Status loop
//!
//! The only place liveness is observed on a timer. Every tick hands one
//! observation to [`Supervisor::poll_liveness`]; state only ever changes
//! as a result of that reconcile.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use super::{ReconcileOutcome, Supervisor};

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run until the task is dropped
pub async fn run(sup: Supervisor) {
    let mut period = sup.settings().timing.watchdog_interval;
    let mut interval = ticker(period);
    log::info!("Watchdog running every {}s", period.as_secs_f32());

    loop {
        interval.tick().await;
        tick(&sup);

        let configured = sup.settings().timing.watchdog_interval;
        if configured != period {
            log::info!("Watchdog interval changed to {}s", configured.as_secs_f32());
            period = configured;
            interval = ticker(period);
            interval.tick().await;
        }
    }
}

/// One liveness check
pub fn tick(sup: &Supervisor) -> Option<ReconcileOutcome> {
    let outcome = sup.poll_liveness();
    match outcome {
        None | Some(ReconcileOutcome::Unchanged) => {}
        Some(other) => log::debug!("Watchdog: {:?}", other),
    }
    outcome
}
