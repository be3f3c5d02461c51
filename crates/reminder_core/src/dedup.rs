use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings key under which the persisted ledger lives.
pub const LEDGER_SETTINGS_KEY: &str = "notifiedReminders";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How much of an occurrence participates in its idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyPolicy {
    /// One notification per item per day. A non-zero lead offset still gets
    /// its own key so distinct offsets never collapse.
    PerDay,
    /// Date, time of day and lead offset all participate.
    #[default]
    PerOccurrence,
}

impl KeyPolicy {
    pub fn key(&self, id: &str, scheduled: NaiveDateTime, lead_minutes: u32) -> NotificationKey {
        let date = scheduled.format("%Y-%m-%d");
        let key = match self {
            Self::PerDay if lead_minutes == 0 => format!("{id}_{date}"),
            Self::PerDay => format!("{id}_{date}_{lead_minutes}min"),
            Self::PerOccurrence => format!(
                "{id}_{date}_{}_{lead_minutes}min",
                scheduled.format("%H:%M")
            ),
        };
        NotificationKey(key)
    }
}

/// Record of sent notifications, keyed by [`NotificationKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationLedger {
    entries: BTreeMap<NotificationKey, NaiveDateTime>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted ledger, skipping entries whose timestamp cannot be read.
    pub fn from_value(value: &Value) -> Self {
        let mut ledger = Self::new();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                tracing::warn!("persisted notification ledger is not an object; starting empty");
            }
            return ledger;
        };
        for (key, sent_at) in map {
            match serde_json::from_value::<NaiveDateTime>(sent_at.clone()) {
                Ok(sent_at) => {
                    ledger
                        .entries
                        .insert(NotificationKey(key.clone()), sent_at);
                }
                Err(err) => tracing::warn!(%key, %err, "dropping unreadable ledger entry"),
            }
        }
        ledger
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn has_fired(&self, key: &NotificationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn mark_fired(&mut self, key: NotificationKey, sent_at: NaiveDateTime) {
        self.entries.insert(key, sent_at);
    }

    pub fn sent_at(&self, key: &NotificationKey) -> Option<NaiveDateTime> {
        self.entries.get(key).copied()
    }

    /// Drops entries sent more than `retention` before `now`; returns how many.
    pub fn prune(&mut self, now: NaiveDateTime, retention: Duration) -> usize {
        let cutoff = now - retention;
        let before = self.entries.len();
        self.entries.retain(|_, sent_at| *sent_at >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn keys_are_pure_and_distinguish_item_and_day() {
        for policy in [KeyPolicy::PerDay, KeyPolicy::PerOccurrence] {
            let a = policy.key("block-1", at(14, 9, 0), 0);
            assert_eq!(a, policy.key("block-1", at(14, 9, 0), 0));
            assert_ne!(a, policy.key("block-2", at(14, 9, 0), 0));
            assert_ne!(a, policy.key("block-1", at(15, 9, 0), 0));
        }
    }

    #[test]
    fn per_day_key_ignores_time_of_day() {
        let policy = KeyPolicy::PerDay;
        assert_eq!(
            policy.key("b", at(14, 9, 0), 0),
            policy.key("b", at(14, 17, 30), 0)
        );
        assert_eq!(policy.key("b", at(14, 9, 0), 0).as_str(), "b_2025-10-14");
    }

    #[test]
    fn lead_offsets_never_collapse() {
        for policy in [KeyPolicy::PerDay, KeyPolicy::PerOccurrence] {
            let zero = policy.key("b", at(14, 9, 0), 0);
            let ten = policy.key("b", at(14, 9, 0), 10);
            let fifteen = policy.key("b", at(14, 9, 0), 15);
            assert_ne!(zero, ten);
            assert_ne!(ten, fifteen);
        }
        assert_eq!(
            KeyPolicy::PerOccurrence.key("b", at(14, 9, 0), 10).as_str(),
            "b_2025-10-14_09:00_10min"
        );
    }

    #[test]
    fn mark_then_check() {
        let mut ledger = NotificationLedger::new();
        let key = KeyPolicy::PerDay.key("b", at(14, 9, 0), 0);
        assert!(!ledger.has_fired(&key));
        ledger.mark_fired(key.clone(), at(14, 9, 0));
        assert!(ledger.has_fired(&key));
        assert_eq!(ledger.sent_at(&key), Some(at(14, 9, 0)));
    }

    #[test]
    fn prune_drops_only_expired_entries() {
        let mut ledger = NotificationLedger::new();
        ledger.mark_fired(KeyPolicy::PerDay.key("old", at(12, 8, 0), 0), at(12, 8, 0));
        ledger.mark_fired(KeyPolicy::PerDay.key("new", at(14, 8, 0), 0), at(14, 8, 0));
        let removed = ledger.prune(at(14, 9, 0), Duration::hours(24));
        assert_eq!(removed, 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.has_fired(&KeyPolicy::PerDay.key("new", at(14, 8, 0), 0)));
    }

    #[test]
    fn survives_a_persistence_round_trip_and_skips_garbage() {
        let mut ledger = NotificationLedger::new();
        ledger.mark_fired(KeyPolicy::PerDay.key("b", at(14, 9, 0), 0), at(14, 9, 1));
        let restored = NotificationLedger::from_value(&ledger.to_value());
        assert_eq!(restored, ledger);

        let partial = NotificationLedger::from_value(&json!({
            "ok_2025-10-14": "2025-10-14T09:00:00",
            "bad": 42,
        }));
        assert_eq!(partial.len(), 1);
        assert!(NotificationLedger::from_value(&json!("nope")).is_empty());
    }
}
