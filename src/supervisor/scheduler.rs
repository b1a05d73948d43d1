//! Scheduled restarts
//!
//! The daily and interval modes feed one countdown to the earliest
//! target. Each target gets at most one warning per threshold and exactly
//! one restart.

use chrono::{DateTime, Local};
use tokio::time::MissedTickBehavior;

use super::{Status, Supervisor, Trigger};
use crate::config::{ScheduleConfig, TimingSettings};
use crate::eventlog::Category;
use crate::notify::NotifyEvent;

/// What a scheduler tick should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerAction {
    /// No restart scheduled
    Idle,
    /// Seconds until the next restart
    Countdown(u64),
    /// Countdown crossed a warning threshold (level 1 = first, 2 = second)
    Warn { level: u8, remaining: u64 },
    Restart,
}

impl SchedulerAction {
    pub fn countdown(&self) -> Option<u64> {
        match self {
            Self::Countdown(secs) | Self::Warn { remaining: secs, .. } => Some(*secs),
            Self::Restart => Some(0),
            Self::Idle => None,
        }
    }
}

/// Warning bookkeeping for the current restart target
#[derive(Debug, Default)]
pub struct RestartPlan {
    warning_level: u8,
    target: Option<DateTime<Local>>,
}

impl RestartPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning_level(&self) -> u8 {
        self.warning_level
    }

    pub fn evaluate(
        &mut self,
        schedule: &ScheduleConfig,
        timing: &TimingSettings,
        now: DateTime<Local>,
        started_at: Option<DateTime<Local>>,
    ) -> SchedulerAction {
        let Some(target) = schedule.next_restart_at(now, started_at) else {
            self.target = None;
            self.warning_level = 0;
            return SchedulerAction::Idle;
        };
        if self.target != Some(target) {
            self.target = Some(target);
            self.warning_level = 0;
        }

        let remaining = u64::try_from((target - now).num_seconds()).unwrap_or(0);

        if remaining <= timing.restart_trigger.as_secs() {
            self.warning_level = 0;
            SchedulerAction::Restart
        } else if remaining <= timing.warn_second.as_secs() && self.warning_level < 2 {
            self.warning_level = 2;
            SchedulerAction::Warn {
                level: 2,
                remaining,
            }
        } else if remaining <= timing.warn_first.as_secs() && self.warning_level < 1 {
            self.warning_level = 1;
            SchedulerAction::Warn {
                level: 1,
                remaining,
            }
        } else {
            SchedulerAction::Countdown(remaining)
        }
    }
}

fn warning_message(level: u8, timing: &TimingSettings) -> String {
    match level {
        1 => format!(
            "Server restarting in {} Minutes.",
            timing.warn_first.as_secs() / 60
        ),
        _ => format!(
            "Server restarting in {} Minutes. SAVE YOUR GAME!",
            timing.warn_second.as_secs() / 60
        ),
    }
}

/// Run until the task is dropped
pub async fn run(sup: Supervisor) {
    let mut plan = RestartPlan::new();
    let mut interval = tokio::time::interval(sup.settings().timing.scheduler_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if tick(&sup, &mut plan).await {
            tokio::time::sleep(sup.settings().timing.post_trigger_sleep).await;
            interval.reset();
        }
    }
}

/// One scheduler evaluation; returns whether a restart was triggered
pub async fn tick(sup: &Supervisor, plan: &mut RestartPlan) -> bool {
    let settings = sup.settings();
    let console = sup.console();
    let state = sup.snapshot();

    if state.status != Status::Online || !settings.schedule.is_enabled() {
        console.set_countdown(None);
        return false;
    }

    let action = plan.evaluate(
        &settings.schedule,
        &settings.timing,
        Local::now(),
        state.started_at,
    );
    console.set_countdown(action.countdown());

    match action {
        SchedulerAction::Idle | SchedulerAction::Countdown(_) => false,
        SchedulerAction::Warn { level, remaining } => {
            let message = warning_message(level, &settings.timing);
            log::info!("{} ({}s remaining)", message, remaining);
            sup.notify(NotifyEvent::Warn, &message);
            sup.events().event(Category::Scheduler, &message);
            false
        }
        SchedulerAction::Restart => {
            sup.events().event(Category::Scheduler, "Restart Triggered.");
            sup.say(">>> Scheduled restart");
            if let Err(e) = sup.restart(Trigger::Scheduler).await {
                log::error!("Scheduled restart failed: {}", e);
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_times;
    use crate::supervisor::testing::{fixture, start_online};
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 14, h, m, s).earliest().unwrap()
    }

    fn daily(times: &str) -> ScheduleConfig {
        ScheduleConfig {
            daily_enabled: true,
            times: parse_times(times),
            ..ScheduleConfig::default()
        }
    }

    #[test]
    fn test_idle_without_schedule() {
        let mut plan = RestartPlan::new();
        let action = plan.evaluate(
            &ScheduleConfig::default(),
            &TimingSettings::default(),
            at(10, 0, 0),
            Some(at(9, 0, 0)),
        );
        assert_eq!(action, SchedulerAction::Idle);
        assert_eq!(action.countdown(), None);
    }

    #[test]
    fn test_warnings_fire_once_per_band() {
        let schedule = daily("12:00");
        let timing = TimingSettings::default();
        let mut plan = RestartPlan::new();

        let mut actions = Vec::new();
        // 11:45:00 to 11:59:50 in 10 second ticks
        let mut now = at(11, 45, 0);
        while now < at(12, 0, 0) {
            actions.push(plan.evaluate(&schedule, &timing, now, None));
            now += Duration::seconds(10);
        }

        let warns: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                SchedulerAction::Warn { level, remaining } => Some((*level, *remaining)),
                _ => None,
            })
            .collect();
        assert_eq!(warns, vec![(1, 600), (2, 300)]);

        let first_restart = actions
            .iter()
            .position(|a| *a == SchedulerAction::Restart)
            .unwrap();
        // 11:59:30 is 30s before the target
        assert_eq!(first_restart, (14 * 60 + 30) / 10);
        assert_eq!(plan.warning_level(), 0);
    }

    #[test]
    fn test_interval_mode_counts_from_start() {
        let schedule = ScheduleConfig {
            interval_enabled: true,
            interval_hours: 2.0,
            ..ScheduleConfig::default()
        };
        let timing = TimingSettings::default();
        let mut plan = RestartPlan::new();

        assert_eq!(
            plan.evaluate(&schedule, &timing, at(11, 0, 0), Some(at(10, 0, 0))),
            SchedulerAction::Countdown(3600)
        );
        assert_eq!(
            plan.evaluate(&schedule, &timing, at(11, 59, 40), Some(at(10, 0, 0))),
            SchedulerAction::Restart
        );
        // No start time known: nothing to count from
        assert_eq!(
            plan.evaluate(&schedule, &timing, at(11, 0, 0), None),
            SchedulerAction::Idle
        );
    }

    #[test]
    fn test_earliest_mode_wins() {
        let mut schedule = daily("18:00");
        schedule.interval_enabled = true;
        schedule.interval_hours = 1.0;
        let mut plan = RestartPlan::new();

        let action = plan.evaluate(
            &schedule,
            &TimingSettings::default(),
            at(10, 30, 0),
            Some(at(10, 0, 0)),
        );
        assert_eq!(action, SchedulerAction::Countdown(1800));
    }

    #[test]
    fn test_new_target_resets_warnings() {
        let schedule = daily("12:00, 12:20");
        let timing = TimingSettings::default();
        let mut plan = RestartPlan::new();

        assert!(matches!(
            plan.evaluate(&schedule, &timing, at(11, 55, 0), None),
            SchedulerAction::Warn { level: 2, .. }
        ));
        assert_eq!(plan.warning_level(), 2);

        // 12:00 has passed, 12:20 is now the target
        assert_eq!(
            plan.evaluate(&schedule, &timing, at(12, 1, 0), None),
            SchedulerAction::Countdown(1140)
        );
        assert_eq!(plan.warning_level(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_ignored_unless_online() {
        let f = fixture(|s| {
            s.schedule.interval_enabled = true;
            s.schedule.interval_hours = 0.001;
        });
        let mut plan = RestartPlan::new();

        assert!(!tick(&f.sup, &mut plan).await);
        f.sup.start(Trigger::User).await.unwrap();
        assert!(!tick(&f.sup, &mut plan).await);
        assert_eq!(f.host.spawn_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_triggers_restart() {
        // 3.6s max uptime is already inside the trigger window
        let f = fixture(|s| {
            s.schedule.interval_enabled = true;
            s.schedule.interval_hours = 0.001;
        });
        start_online(&f).await;
        let mut plan = RestartPlan::new();

        assert!(tick(&f.sup, &mut plan).await);
        assert_eq!(f.host.spawn_count(), 2);
        assert_eq!(f.sup.snapshot().status, Status::Starting);
        assert_eq!(f.sup.snapshot().crash_count, 0);
        assert_eq!(f.console.displayed().countdown, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_sends_warning_once() {
        // 8 minutes of uptime allowed: inside the first warning band
        let f = fixture(|s| {
            s.schedule.interval_enabled = true;
            s.schedule.interval_hours = 8.0 / 60.0;
        });
        start_online(&f).await;
        let mut plan = RestartPlan::new();

        assert!(!tick(&f.sup, &mut plan).await);
        assert!(!tick(&f.sup, &mut plan).await);
        assert_eq!(
            f.sink.messages(NotifyEvent::Warn),
            vec!["Server restarting in 10 Minutes."]
        );
        assert!(f.console.displayed().countdown.is_some());
    }
}
