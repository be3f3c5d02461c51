use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HostError, ScanError};
use crate::host::{BlockQuery, BlockRecord, BlockSource};
use crate::time::{
    all_day_reminder_time, parse_all_day_date, parse_scheduled_datetime, start_of_day,
};

pub const SCHEDULED_MARKER: &str = "SCHEDULED:";
pub const HORIZON_DAYS: i64 = 7;
pub const RECENT_GRACE_MINUTES: i64 = 5;
pub const PLACEHOLDER_TEXT: &str = "Scheduled reminder";

static SCHEDULED_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SCHEDULED:\s*<[^>]+>").expect("scheduled timestamp pattern"));
static SCHEDULED_PROPERTY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*scheduled::\s*[^\n]+$").expect("scheduled property pattern")
});
static LEADING_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s*").expect("leading bullet pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub container_name: String,
    pub display_text: String,
    pub when: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
}

/// Lower edge of the scan window. The upper edge is always
/// start-of-today plus [`HORIZON_DAYS`], inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HorizonPolicy {
    #[default]
    StartOfToday,
    /// Five minutes before now, so "right now" reminders survive a rescan.
    RecentGrace,
    Now,
}

impl HorizonPolicy {
    pub fn window(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let today = start_of_day(now);
        let lower = match self {
            Self::StartOfToday => today,
            Self::RecentGrace => now - Duration::minutes(RECENT_GRACE_MINUTES),
            Self::Now => now,
        };
        (lower, today + Duration::days(HORIZON_DAYS))
    }

    pub fn contains(&self, when: NaiveDateTime, now: NaiveDateTime) -> bool {
        let (lower, upper) = self.window(now);
        when >= lower && when <= upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanOptions {
    pub horizon: HorizonPolicy,
    /// Hour at which date-only markers fire; `None` ignores them.
    pub all_day_hour: Option<f64>,
}

pub struct ReminderScanner {
    source: Arc<dyn BlockSource>,
    marker: String,
}

impl ReminderScanner {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        Self {
            source,
            marker: SCHEDULED_MARKER.to_string(),
        }
    }

    /// Queries both block shapes and returns the reminders inside the horizon,
    /// one per block id. Fails only when neither query could be answered.
    pub async fn scan(
        &self,
        now: NaiveDateTime,
        options: ScanOptions,
    ) -> Result<Vec<ReminderRecord>, ScanError> {
        let content_query = BlockQuery::ContainsMarker(self.marker.clone());
        let property_query = BlockQuery::HasScheduledProperty;
        let (content, property) = tokio::join!(
            self.source.query(&content_query),
            self.source.query(&property_query)
        );

        let blocks = match (content, property) {
            (Err(content), Err(property)) => {
                return Err(ScanError::QueriesFailed { content, property })
            }
            (content, property) => {
                let mut blocks = blocks_or_empty(content, "content");
                blocks.extend(blocks_or_empty(property, "property"));
                blocks
            }
        };
        debug!(count = blocks.len(), "candidate blocks returned by host");

        let mut reminders = Vec::new();
        for block in &blocks {
            let Some(reminder) = parse_block(block, options.all_day_hour) else {
                debug!(id = %block.id, "no parseable time in block");
                continue;
            };
            if !options.horizon.contains(reminder.when, now) {
                debug!(id = %block.id, when = %reminder.when, "outside horizon");
                continue;
            }
            reminders.push(reminder);
        }

        Ok(dedup_by_id(reminders))
    }
}

fn blocks_or_empty(result: Result<Vec<BlockRecord>, HostError>, query: &str) -> Vec<BlockRecord> {
    result.unwrap_or_else(|err| {
        warn!(query, %err, "block query failed");
        Vec::new()
    })
}

/// Turns a block into a reminder: raw text first, then the structured
/// property, then (when enabled) date-only markers in the same order.
pub fn parse_block(block: &BlockRecord, all_day_hour: Option<f64>) -> Option<ReminderRecord> {
    let property = block.scheduled_property.as_deref();
    let timed = parse_scheduled_datetime(&block.raw_text)
        .or_else(|| property.and_then(parse_scheduled_datetime));

    let (when, all_day) = match (timed, all_day_hour) {
        (Some(when), _) => (when, false),
        (None, Some(hour)) => {
            let date = parse_all_day_date(&block.raw_text)
                .or_else(|| property.and_then(parse_all_day_date))?;
            (all_day_reminder_time(date, hour)?, true)
        }
        (None, None) => return None,
    };

    Some(ReminderRecord {
        id: block.id.clone(),
        container_name: block.container_name.clone(),
        display_text: clean_display_text(&block.raw_text),
        when,
        all_day,
    })
}

/// Strips scheduling syntax and the leading bullet from block text.
pub fn clean_display_text(raw: &str) -> String {
    let without_timestamps = SCHEDULED_TIMESTAMP.replace_all(raw, "");
    let without_properties = SCHEDULED_PROPERTY_LINE.replace_all(&without_timestamps, "");
    let cleaned = LEADING_BULLET.replace(&without_properties, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        PLACEHOLDER_TEXT.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Keeps the first reminder seen for each id, preserving order.
pub fn dedup_by_id(reminders: Vec<ReminderRecord>) -> Vec<ReminderRecord> {
    let mut seen = HashSet::new();
    reminders
        .into_iter()
        .filter(|reminder| seen.insert(reminder.id.clone()))
        .collect()
}
