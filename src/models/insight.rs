use serde::{Deserialize, Serialize};

/// Per (domain, date) browsing aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightEntry {
    pub domain: String,
    /// "YYYY-MM-DD"
    pub date: String,
    pub visit_count: u32,
    pub total_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl InsightEntry {
    pub fn new(domain: &str, date: &str, minutes: f64) -> Self {
        Self {
            domain: domain.to_string(),
            date: date.to_string(),
            visit_count: 1,
            total_minutes: minutes,
            category: None,
        }
    }
}

/// Insert or extend the entry keyed by (domain, date).
pub fn upsert(insights: &mut Vec<InsightEntry>, domain: &str, date: &str, minutes: f64) {
    match insights
        .iter_mut()
        .find(|e| e.domain == domain && e.date == date)
    {
        Some(entry) => {
            entry.visit_count += 1;
            entry.total_minutes += minutes;
        }
        None => insights.push(InsightEntry::new(domain, date, minutes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_then_increments() {
        let mut insights = Vec::new();
        upsert(&mut insights, "x.com", "2026-06-15", 1.5);
        upsert(&mut insights, "x.com", "2026-06-15", 0.5);
        upsert(&mut insights, "x.com", "2026-06-16", 2.0);

        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].visit_count, 2);
        assert!((insights[0].total_minutes - 2.0).abs() < f64::EPSILON);
        assert_eq!(insights[1].visit_count, 1);
    }
}
