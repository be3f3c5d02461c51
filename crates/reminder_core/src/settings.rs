use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::dedup::KeyPolicy;
use crate::due::{DuePolicy, QuietHours};
use crate::scanner::HorizonPolicy;

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
pub const MAX_POLL_INTERVAL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_PERIODIC_RESCAN_MINUTES: u64 = 2;
pub const MAX_PERIODIC_RESCAN_MINUTES: u64 = 7 * 24 * 60;
pub const DEFAULT_DAILY_RESCAN_HOUR: u32 = 3;
pub const DEFAULT_RETENTION_HOURS: u64 = 24;
pub const MAX_RETENTION_HOURS: u64 = 30 * 24;
pub const DEFAULT_ALL_DAY_HOUR: f64 = 9.0;

/// Where the notification ledger lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DedupStorage {
    /// Process memory only; forgotten at shutdown.
    Session,
    /// Written back to the host settings store after every change.
    #[default]
    Persisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuietHoursSetting {
    pub enabled: bool,
    pub start: u32,
    pub end: u32,
}

impl Default for QuietHoursSetting {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 22,
            end: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AllDaySetting {
    pub enabled: bool,
    pub hour: f64,
}

impl Default for AllDaySetting {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: DEFAULT_ALL_DAY_HOUR,
        }
    }
}

/// Typed view over the host's settings blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub poll_interval_seconds: u64,
    pub periodic_rescan_minutes: u64,
    pub daily_rescan_hour: u32,
    /// Lead offsets in minutes, evaluated in this order.
    pub lead_time_minutes: Vec<u32>,
    pub retention_hours: u64,
    pub dedup_storage: DedupStorage,
    pub key_policy: KeyPolicy,
    pub suppress_significantly_past: bool,
    pub quiet_hours: QuietHoursSetting,
    pub horizon: HorizonPolicy,
    pub all_day: AllDaySetting,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            periodic_rescan_minutes: DEFAULT_PERIODIC_RESCAN_MINUTES,
            daily_rescan_hour: DEFAULT_DAILY_RESCAN_HOUR,
            lead_time_minutes: vec![0],
            retention_hours: DEFAULT_RETENTION_HOURS,
            dedup_storage: DedupStorage::default(),
            key_policy: KeyPolicy::default(),
            suppress_significantly_past: true,
            quiet_hours: QuietHoursSetting::default(),
            horizon: HorizonPolicy::default(),
            all_day: AllDaySetting::default(),
        }
    }
}

impl ReminderSettings {
    /// Reads settings field by field; anything missing or malformed falls back
    /// to its default with a warning.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                warn!("settings payload is not an object; using defaults");
            }
            return defaults;
        };

        Self {
            poll_interval_seconds: read(
                map,
                "pollIntervalSeconds",
                defaults.poll_interval_seconds,
                |v| (1..=MAX_POLL_INTERVAL_SECONDS).contains(v),
            ),
            periodic_rescan_minutes: read(
                map,
                "periodicRescanMinutes",
                defaults.periodic_rescan_minutes,
                |v| (1..=MAX_PERIODIC_RESCAN_MINUTES).contains(v),
            ),
            daily_rescan_hour: read(map, "dailyRescanHour", defaults.daily_rescan_hour, |v| {
                *v <= 23
            }),
            lead_time_minutes: read_lead_times(map).unwrap_or(defaults.lead_time_minutes),
            retention_hours: read(map, "retentionHours", defaults.retention_hours, |v| {
                (1..=MAX_RETENTION_HOURS).contains(v)
            }),
            dedup_storage: read(map, "dedupStorage", defaults.dedup_storage, |_| true),
            key_policy: read(map, "keyPolicy", defaults.key_policy, |_| true),
            suppress_significantly_past: read(
                map,
                "suppressSignificantlyPast",
                defaults.suppress_significantly_past,
                |_| true,
            ),
            quiet_hours: read(map, "quietHours", defaults.quiet_hours, |q: &QuietHoursSetting| {
                q.start <= 23 && q.end <= 23
            }),
            horizon: read(map, "horizon", defaults.horizon, |_| true),
            all_day: read(map, "allDay", defaults.all_day, |a: &AllDaySetting| {
                a.hour.is_finite() && (0.0..24.0).contains(&a.hour)
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn due_policy(&self) -> DuePolicy {
        DuePolicy {
            suppress_significantly_past: self.suppress_significantly_past,
            quiet_hours: self.quiet_hours.enabled.then_some(QuietHours {
                start: self.quiet_hours.start,
                end: self.quiet_hours.end,
            }),
        }
    }

    pub fn retention(&self) -> Duration {
        let hours = self.retention_hours.clamp(1, MAX_RETENTION_HOURS);
        Duration::hours(i64::try_from(hours).unwrap_or(1))
    }

    pub fn all_day_hour(&self) -> Option<f64> {
        self.all_day.enabled.then_some(self.all_day.hour)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        let seconds = self
            .poll_interval_seconds
            .clamp(1, MAX_POLL_INTERVAL_SECONDS);
        std::time::Duration::from_secs(seconds)
    }

    pub fn periodic_rescan_interval(&self) -> std::time::Duration {
        let minutes = self
            .periodic_rescan_minutes
            .clamp(1, MAX_PERIODIC_RESCAN_MINUTES);
        std::time::Duration::from_secs(minutes * 60)
    }
}

/// Which timers have to be recreated after a settings change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsDiff {
    pub due_check: bool,
    pub periodic_rescan: bool,
    pub daily_rescan: bool,
}

impl SettingsDiff {
    pub fn between(old: &ReminderSettings, new: &ReminderSettings) -> Self {
        Self {
            due_check: old.poll_interval_seconds != new.poll_interval_seconds,
            periodic_rescan: old.periodic_rescan_minutes != new.periodic_rescan_minutes,
            daily_rescan: old.daily_rescan_hour != new.daily_rescan_hour,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.due_check || self.periodic_rescan || self.daily_rescan)
    }
}

fn read<T: DeserializeOwned>(
    map: &Map<String, Value>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T {
    let Some(raw) = map.get(key).filter(|raw| !raw.is_null()) else {
        return default;
    };
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key, value = %raw, "invalid setting; using default");
            default
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LeadTimes {
    One(u32),
    Many(Vec<u32>),
    Text(String),
}

/// Accepts `10`, `[0, 10, 30]` or `"0, 10, 30"`. Duplicates are dropped, order kept.
fn read_lead_times(map: &Map<String, Value>) -> Option<Vec<u32>> {
    let raw = map.get("leadTimeMinutes").filter(|raw| !raw.is_null())?;
    let parsed = match serde_json::from_value::<LeadTimes>(raw.clone()) {
        Ok(LeadTimes::One(minutes)) => Some(vec![minutes]),
        Ok(LeadTimes::Many(list)) => Some(list),
        Ok(LeadTimes::Text(text)) => text
            .split(',')
            .map(|part| part.trim().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>(),
        Err(_) => None,
    };

    let mut leads: Vec<u32> = Vec::new();
    for minutes in parsed.unwrap_or_default() {
        if !leads.contains(&minutes) {
            leads.push(minutes);
        }
    }
    if leads.is_empty() {
        warn!(value = %raw, "invalid leadTimeMinutes; using default");
        return None;
    }
    Some(leads)
}
