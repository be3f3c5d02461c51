use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Reminders scheduled further than this before "now" are considered missed.
pub const PAST_GRACE_MINUTES: i64 = 5;

/// `true` once `now` has reached `scheduled - lead_minutes`.
pub fn is_time_to_notify(scheduled: NaiveDateTime, lead_minutes: u32, now: NaiveDateTime) -> bool {
    let notify_at = scheduled - Duration::minutes(i64::from(lead_minutes));
    now >= notify_at
}

/// Hour-of-day window during which nothing fires. `start > end` wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        if self.start > self.end {
            hour >= self.start || hour < self.end
        } else {
            hour >= self.start && hour < self.end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DuePolicy {
    pub suppress_significantly_past: bool,
    pub quiet_hours: Option<QuietHours>,
}

impl DuePolicy {
    pub fn should_notify(
        &self,
        scheduled: NaiveDateTime,
        lead_minutes: u32,
        now: NaiveDateTime,
    ) -> bool {
        if self.quiet_hours.is_some_and(|quiet| quiet.contains(now)) {
            return false;
        }
        if self.suppress_significantly_past && is_significantly_past(scheduled, now) {
            return false;
        }
        is_time_to_notify(scheduled, lead_minutes, now)
    }
}

pub fn is_significantly_past(scheduled: NaiveDateTime, now: NaiveDateTime) -> bool {
    scheduled < now - Duration::minutes(PAST_GRACE_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn due_at_exact_time_without_lead() {
        let t = at(14, 30);
        assert!(is_time_to_notify(t, 0, t));
        assert!(!is_time_to_notify(t, 0, t - Duration::minutes(1)));
    }

    #[test]
    fn lead_time_moves_the_trigger_earlier() {
        let t = at(14, 30);
        assert!(is_time_to_notify(t, 10, t - Duration::minutes(5)));
        assert!(is_time_to_notify(t, 10, t - Duration::minutes(10)));
        assert!(!is_time_to_notify(t, 10, t - Duration::minutes(11)));
    }

    #[test]
    fn same_day_quiet_hours() {
        let quiet = QuietHours { start: 13, end: 15 };
        assert!(!quiet.contains(at(12, 59)));
        assert!(quiet.contains(at(13, 0)));
        assert!(quiet.contains(at(14, 59)));
        assert!(!quiet.contains(at(15, 0)));
    }

    #[test]
    fn overnight_quiet_hours_wrap_midnight() {
        let quiet = QuietHours { start: 22, end: 7 };
        assert!(quiet.contains(at(22, 0)));
        assert!(quiet.contains(at(0, 30)));
        assert!(quiet.contains(at(6, 59)));
        assert!(!quiet.contains(at(7, 0)));
        assert!(!quiet.contains(at(21, 59)));
    }

    #[test]
    fn default_policy_fires_for_old_reminders() {
        let policy = DuePolicy::default();
        assert!(policy.should_notify(at(9, 0), 0, at(14, 0)));
    }

    #[test]
    fn past_suppression_allows_small_delays_only() {
        let policy = DuePolicy {
            suppress_significantly_past: true,
            quiet_hours: None,
        };
        assert!(policy.should_notify(at(14, 0), 0, at(14, 5)));
        assert!(!policy.should_notify(at(14, 0), 0, at(14, 6)));
    }

    #[test]
    fn quiet_hours_block_due_reminders() {
        let policy = DuePolicy {
            suppress_significantly_past: false,
            quiet_hours: Some(QuietHours { start: 22, end: 7 }),
        };
        assert!(!policy.should_notify(at(23, 0), 0, at(23, 0)));
        assert!(policy.should_notify(at(8, 0), 0, at(8, 0)));
    }
}
