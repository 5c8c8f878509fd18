use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::timeutil::{parse_hhmm, same_site};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ];

    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

/// A recurring weekly window during which an item is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub days: Vec<DayOfWeek>,
    /// Start time in HH:MM format (24-hour).
    pub start_time: String,
    /// End time in HH:MM format (24-hour). Earlier than start for overnight windows.
    pub end_time: String,
}

impl Schedule {
    /// Check if this schedule lists the weekday of `date`.
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.days.contains(&DayOfWeek::from_weekday(date.weekday()))
    }

    /// Parsed (start, end) times, or None when either is malformed.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_hhmm(&self.start_time)?, parse_hhmm(&self.end_time)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Domain,
    Keyword,
}

/// One user-configured block target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedItem {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit_minutes: Option<u32>,
    /// Blocked only once the daily limit is exceeded.
    #[serde(default)]
    pub limit_only: bool,
    /// Minutes, reset at local midnight.
    #[serde(default)]
    pub screen_time_today: f64,
    /// Epoch ms; the item is exempt while now is before this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_allow_until: Option<i64>,
    /// Date on which the 80% warning already fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_fired_at: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl BlockedItem {
    pub fn new(url: &str, item_type: ItemType, created_at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            item_type,
            favicon: None,
            schedule: None,
            daily_limit_minutes: None,
            limit_only: false,
            screen_time_today: 0.0,
            temporary_allow_until: None,
            warning_fired_at: None,
            created_at,
        }
    }

    /// Whether a reported browsing domain counts against this item.
    pub fn matches_domain(&self, domain: &str) -> bool {
        same_site(&self.url, domain)
    }

    pub fn is_limited(&self) -> bool {
        self.daily_limit_minutes
            .is_some_and(|limit| self.screen_time_today >= f64::from(limit))
    }

    pub fn is_temporarily_allowed(&self, now_ms: i64) -> bool {
        self.temporary_allow_until.is_some_and(|until| until > now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_extension_json() {
        let json = r#"{
            "id": "1700000000000-abc",
            "url": "reddit.com",
            "type": "domain",
            "favicon": "https://icons/reddit.png",
            "schedule": {"days": ["Mon", "Fri"], "startTime": "09:00", "endTime": "17:00"},
            "dailyLimitMinutes": 30,
            "screenTimeToday": 12.5,
            "createdAt": 1700000000000
        }"#;
        let item: BlockedItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.item_type, ItemType::Domain);
        assert_eq!(item.daily_limit_minutes, Some(30));
        assert!(!item.limit_only);
        assert_eq!(item.schedule.unwrap().days, vec![DayOfWeek::Mon, DayOfWeek::Fri]);
        assert_eq!(item.favicon.as_deref(), Some("https://icons/reddit.png"));
    }

    #[test]
    fn test_serializes_camel_case_and_skips_absent_fields() {
        let item = BlockedItem::new("gambling", ItemType::Keyword, 42);
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["type"], "keyword");
        assert_eq!(value["screenTimeToday"], 0.0);
        assert!(value.get("temporaryAllowUntil").is_none());
        assert!(value.get("schedule").is_none());
    }

    #[test]
    fn test_is_limited() {
        let mut item = BlockedItem::new("x.com", ItemType::Domain, 0);
        item.screen_time_today = 100.0;
        assert!(!item.is_limited());

        item.daily_limit_minutes = Some(60);
        assert!(item.is_limited());

        item.screen_time_today = 59.9;
        assert!(!item.is_limited());
    }

    #[test]
    fn test_matches_domain_with_www() {
        let item = BlockedItem::new("www.x.com", ItemType::Domain, 0);
        assert!(item.matches_domain("x.com"));
        assert!(!item.matches_domain("y.com"));
    }

    #[test]
    fn test_schedule_applies_to_day() {
        let schedule = Schedule {
            days: vec![DayOfWeek::Mon, DayOfWeek::Tue],
            start_time: "09:00".into(),
            end_time: "12:00".into(),
        };
        // 2026-06-15 is a Monday
        assert!(schedule.applies_to(NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()));
        assert!(!schedule.applies_to(NaiveDate::from_ymd_opt(2026, 6, 20).unwrap()));
    }
}
