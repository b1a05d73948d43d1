//! Restart schedule settings
//!
//! Two independent modes feed one restart target:
//! - daily: wall-clock `HH:MM` targets on enabled weekdays
//! - interval: a maximum uptime in hours

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone};

/// Longest accepted uptime interval (one year)
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 366.0;

/// Snapshot of the restart schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub daily_enabled: bool,
    /// Enabled weekdays, 0 = Monday
    pub days_of_week: Vec<u32>,
    /// Restart times, sorted
    pub times: Vec<NaiveTime>,
    pub interval_enabled: bool,
    pub interval_hours: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_enabled: false,
            days_of_week: (0..7).collect(),
            times: parse_times("00:00, 04:00, 08:00, 12:00, 16:00, 20:00"),
            interval_enabled: false,
            interval_hours: 4.0,
        }
    }
}

impl ScheduleConfig {
    pub fn is_enabled(&self) -> bool {
        self.daily_enabled || self.interval_enabled
    }

    /// Next fixed-time target at or after `now`, looking up to a week ahead
    pub fn next_daily_target(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if !self.daily_enabled || self.times.is_empty() {
            return None;
        }

        for offset in 0..=7 {
            let date = now.date_naive() + Duration::days(offset);
            if !self.days_of_week.contains(&date.weekday().num_days_from_monday()) {
                continue;
            }

            let earliest = self
                .times
                .iter()
                .filter_map(|t| Local.from_local_datetime(&date.and_time(*t)).earliest())
                .filter(|candidate| *candidate >= now)
                .min();

            if earliest.is_some() {
                return earliest;
            }
        }

        None
    }

    /// Uptime-based target given when the process started
    pub fn next_interval_target(&self, started_at: Option<DateTime<Local>>) -> Option<DateTime<Local>> {
        if !self.interval_enabled || self.interval_hours <= 0.0 {
            return None;
        }
        let started_at = started_at?;
        if !self.interval_hours.is_finite() {
            return None;
        }
        let secs = (self.interval_hours * 3600.0).round() as i64;
        started_at.checked_add_signed(Duration::try_seconds(secs)?)
    }

    /// Earliest restart target across both modes
    pub fn next_restart_at(
        &self,
        now: DateTime<Local>,
        started_at: Option<DateTime<Local>>,
    ) -> Option<DateTime<Local>> {
        match (self.next_daily_target(now), self.next_interval_target(started_at)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Parse a comma-separated list of `HH:MM` times, skipping invalid entries
pub fn parse_times(raw: &str) -> Vec<NaiveTime> {
    let mut times: Vec<NaiveTime> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match NaiveTime::parse_from_str(s, "%H:%M") {
            Ok(t) => Some(t),
            Err(_) => {
                log::warn!("Ignoring invalid restart time '{}'", s);
                None
            }
        })
        .collect();
    times.sort();
    times.dedup();
    times
}

/// Parse a comma-separated list of weekday indices (0 = Monday)
pub fn parse_days(raw: &str) -> Vec<u32> {
    let mut days: Vec<u32> = raw
        .split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .filter(|d| *d < 7)
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn daily(times: &str, days: &str) -> ScheduleConfig {
        ScheduleConfig {
            daily_enabled: true,
            days_of_week: parse_days(days),
            times: parse_times(times),
            interval_enabled: false,
            interval_hours: 4.0,
        }
    }

    #[test]
    fn test_parse_times() {
        let times = parse_times("16:00, 04:00,bogus, 25:00 ,04:00");
        assert_eq!(
            times,
            vec![
                NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(16, 0, 0).unwrap()
            ]
        );
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("0,1, 6,9,x"), vec![0, 1, 6]);
    }

    #[test]
    fn test_next_target_later_today() {
        // 2026-10-14 is a Wednesday
        let cfg = daily("04:00, 16:00", "0,1,2,3,4,5,6");
        let now = local(2026, 10, 14, 10, 30);
        assert_eq!(cfg.next_daily_target(now), Some(local(2026, 10, 14, 16, 0)));
    }

    #[test]
    fn test_next_target_wraps_to_tomorrow() {
        let cfg = daily("04:00, 16:00", "0,1,2,3,4,5,6");
        let now = local(2026, 10, 14, 17, 0);
        assert_eq!(cfg.next_daily_target(now), Some(local(2026, 10, 15, 4, 0)));
    }

    #[test]
    fn test_next_target_skips_disabled_weekdays() {
        // Only Mondays; from Wednesday the next target is the following Monday
        let cfg = daily("06:00", "0");
        let now = local(2026, 10, 14, 7, 0);
        assert_eq!(cfg.next_daily_target(now), Some(local(2026, 10, 19, 6, 0)));
    }

    #[test]
    fn test_no_target_when_disabled_or_empty() {
        let mut cfg = daily("06:00", "0,1,2,3,4,5,6");
        cfg.daily_enabled = false;
        assert!(cfg.next_daily_target(local(2026, 10, 14, 7, 0)).is_none());

        let cfg = daily("", "0,1,2,3,4,5,6");
        assert!(cfg.next_daily_target(local(2026, 10, 14, 7, 0)).is_none());

        let cfg = daily("06:00", "");
        assert!(cfg.next_daily_target(local(2026, 10, 14, 7, 0)).is_none());
    }

    #[test]
    fn test_interval_target() {
        let cfg = ScheduleConfig {
            daily_enabled: false,
            interval_enabled: true,
            interval_hours: 1.5,
            ..ScheduleConfig::default()
        };
        let started = local(2026, 10, 14, 10, 0);
        assert_eq!(
            cfg.next_interval_target(Some(started)),
            Some(local(2026, 10, 14, 11, 30))
        );
        assert!(cfg.next_interval_target(None).is_none());
    }

    #[test]
    fn test_interval_target_overflow() {
        let cfg = ScheduleConfig {
            daily_enabled: false,
            interval_enabled: true,
            interval_hours: 1e15,
            ..ScheduleConfig::default()
        };
        let now = local(2026, 10, 14, 10, 0);
        assert!(cfg.next_interval_target(Some(now)).is_none());
        assert!(cfg.next_restart_at(now, Some(now)).is_none());

        let cfg = ScheduleConfig {
            interval_hours: f64::INFINITY,
            ..cfg
        };
        assert!(cfg.next_interval_target(Some(now)).is_none());
    }

    #[test]
    fn test_earliest_mode_wins() {
        let mut cfg = daily("12:00", "0,1,2,3,4,5,6");
        cfg.interval_enabled = true;
        cfg.interval_hours = 1.0;
        let now = local(2026, 10, 14, 10, 0);
        let started = local(2026, 10, 14, 9, 30);
        assert_eq!(
            cfg.next_restart_at(now, Some(started)),
            Some(local(2026, 10, 14, 10, 30))
        );
    }
}
