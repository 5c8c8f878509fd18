//! Domain normalization, local date/time helpers and schedule-window evaluation.
//!
//! All calendar logic runs in local time: daily resets happen at local midnight
//! and schedule windows are wall-clock ranges.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Timelike};
use url::Url;

use crate::models::Schedule;

/// Normalize a user-entered URL or host to a plain hostname without `www.`.
///
/// Falls back to best-effort string stripping when the input does not parse.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    if let Ok(url) = Url::parse(&candidate) {
        if let Some(host) = url.host_str() {
            return strip_www(host).to_string();
        }
    }

    let without_scheme = trimmed
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = without_scheme.split('/').next().unwrap_or("");
    strip_www(host).trim().to_string()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Whether two domains name the same site, treating a `www.` prefix as equivalent.
pub fn same_site(a: &str, b: &str) -> bool {
    strip_www(a).eq_ignore_ascii_case(strip_www(b))
}

/// Local calendar date as "YYYY-MM-DD".
pub fn day_string(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Parse "HH:MM" (24-hour).
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Check if a schedule window covers `now`.
///
/// Only the current weekday is consulted. Overnight windows (end before start)
/// cover both the late evening and the early morning of a listed day.
pub fn is_schedule_active(schedule: &Schedule, now: DateTime<Local>) -> bool {
    if !schedule.applies_to(now.date_naive()) {
        return false;
    }
    let Some((start, end)) = schedule.window() else {
        return false;
    };

    let current = now.time().with_second(0).and_then(|t| t.with_nanosecond(0));
    let Some(current) = current else {
        return false;
    };

    if end > start {
        current >= start && current < end
    } else {
        current >= start || current < end
    }
}

/// Resolve a local wall-clock instant, taking the earlier reading on DST overlaps.
pub fn local_at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

/// The next local midnight strictly after `now`.
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let tomorrow = now.date_naive() + Duration::days(1);
    local_at(tomorrow, NaiveTime::MIN).unwrap_or_else(|| now + Duration::days(1))
}

/// The next local occurrence of `hour:00` strictly after `now`.
pub fn next_local_hour(now: DateTime<Local>, hour: u32) -> DateTime<Local> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    match local_at(now.date_naive(), time) {
        Some(today) if today > now => today,
        _ => local_at(now.date_naive() + Duration::days(1), time)
            .unwrap_or_else(|| now + Duration::days(1)),
    }
}

/// Convert epoch milliseconds to a local instant.
pub fn from_millis(ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(ms).single()
}

/// Format minutes as "Xh Ym" or "Ym".
pub fn format_minutes(minutes: f64) -> String {
    let whole = minutes.max(0.0).round();
    let hours = (whole / 60.0).floor();
    let rest = whole - hours * 60.0;
    if hours < 1.0 {
        format!("{whole:.0}m")
    } else if rest < 1.0 {
        format!("{hours:.0}h")
    } else {
        format!("{hours:.0}h {rest:.0}m")
    }
}
