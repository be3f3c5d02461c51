use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static JOURNAL_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(\d{4})-(\d{2})-(\d{2})\s+\w+\s+(\d{1,2}):(\d{2})>")
        .expect("journal timestamp pattern")
});

static PROPERTY_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})[T\s](\d{1,2}):(\d{2})")
        .expect("property timestamp pattern")
});

static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})T(\d{1,2}):(\d{2}):\d{2}").expect("iso timestamp pattern")
});

static ALL_DAY_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(\d{4})-(\d{2})-(\d{2})(?:\s+\w+)?>").expect("all-day timestamp pattern")
});

static ALL_DAY_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("all-day property pattern"));

/// Extracts a local date and minute-precision time from free-form text.
///
/// The journal form `<2025-10-14 Tue 14:30>` wins over the bare property
/// form `2025-10-14 14:30` / `2025-10-14T14:30`, which wins over the ISO form
/// `2025-10-14T14:30:00`. Only the first occurrence of the first matching
/// shape is considered; if its fields are out of range the text yields
/// nothing rather than falling through to a later shape.
pub fn parse_scheduled_datetime(text: &str) -> Option<NaiveDateTime> {
    let captures = JOURNAL_TIMESTAMP
        .captures(text)
        .or_else(|| PROPERTY_TIMESTAMP.captures(text))
        .or_else(|| ISO_TIMESTAMP.captures(text))?;
    datetime_from_captures(&captures)
}

/// Date-only markers: `<2025-10-14>`, `<2025-10-14 Tue>`, or a property value
/// that is exactly `2025-10-14`.
pub fn parse_all_day_date(text: &str) -> Option<NaiveDate> {
    if let Some(captures) = ALL_DAY_TIMESTAMP.captures(text) {
        return date_from_captures(&captures);
    }
    let captures = ALL_DAY_PROPERTY.captures(text.trim())?;
    date_from_captures(&captures)
}

/// Places an all-day reminder at a fractional hour of its date (9.5 is 09:30).
pub fn all_day_reminder_time(date: NaiveDate, hour: f64) -> Option<NaiveDateTime> {
    if !hour.is_finite() || !(0.0..24.0).contains(&hour) {
        return None;
    }
    let total_minutes = (hour * 60.0).round() as u32;
    let time = NaiveTime::from_hms_opt(total_minutes / 60, total_minutes % 60, 0)?;
    Some(date.and_time(time))
}

pub fn start_of_day(moment: NaiveDateTime) -> NaiveDateTime {
    moment.date().and_time(NaiveTime::MIN)
}

/// Renders `when` relative to `now`: "Today at 14:30", "Tomorrow at 14:30",
/// or "2025-10-20 at 14:30".
pub fn format_for_notification(when: NaiveDateTime, now: NaiveDateTime) -> String {
    let time = when.format("%H:%M");
    let today = now.date();
    if when.date() == today {
        format!("Today at {time}")
    } else if Some(when.date()) == today.checked_add_signed(Duration::days(1)) {
        format!("Tomorrow at {time}")
    } else {
        format!("{} at {time}", when.format("%Y-%m-%d"))
    }
}

fn datetime_from_captures(captures: &Captures<'_>) -> Option<NaiveDateTime> {
    let date = date_from_captures(captures)?;
    let hour = field(captures, 4)?;
    let minute = field(captures, 5)?;
    if hour > 23 || minute > 59 {
        return None;
    }
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(date.and_time(time))
}

fn date_from_captures(captures: &Captures<'_>) -> Option<NaiveDate> {
    let year = field(captures, 1)?;
    let month = field(captures, 2)?;
    let day = field(captures, 3)?;
    if year < 1970 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    // chrono refuses calendar-impossible days such as Feb 30 instead of rolling over.
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

fn field(captures: &Captures<'_>, index: usize) -> Option<u32> {
    captures.get(index)?.as_str().parse().ok()
}
