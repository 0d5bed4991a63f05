// Date helpers for benefit and termination dates
//
// The MEMD API takes dates as ISO-8601 local timestamps truncated to midnight,
// without an offset, e.g. `2024-03-01T00:00:00`.

use chrono::{Local, NaiveDate, NaiveDateTime};

const MIDNIGHT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Format a date as an ISO timestamp at midnight
pub fn midnight_iso(date: NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .format(MIDNIGHT_FORMAT)
        .to_string()
}

/// Today's date formatted as an ISO timestamp at midnight
pub fn today_midnight_iso() -> String {
    midnight_iso(today())
}

/// Parse a benefit date given either as a date or as an ISO timestamp
pub fn parse_benefit_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(datetime.date());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(datetime.date());
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|datetime| datetime.date_naive())
}
