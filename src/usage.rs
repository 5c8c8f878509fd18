//! Browsing-time accounting: insights, daily limits, warnings, break reminders,
//! the midnight reset and the evening summary.

use log::{debug, info};
use std::sync::Arc;

use crate::clock::Clock;
use crate::constants::{LIMIT_WARNING_RATIO, MS_PER_MINUTE};
use crate::error::Result;
use crate::models::insight;
use crate::notify::{Notification, Notifications};
use crate::store::{keys, PolicyStore};
use crate::timeutil::{day_string, format_minutes, normalize_domain};

/// What a single time report triggered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOutcome {
    /// Daily limits, in minutes, crossed by this report.
    pub limits_reached: Vec<u32>,
    /// Remaining minutes of each 80% warning fired by this report.
    pub warnings: Vec<f64>,
    pub break_reminder: bool,
}

pub struct UsageTracker {
    store: PolicyStore,
    notifications: Notifications,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(store: PolicyStore, notifications: Notifications, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifications,
            clock,
        }
    }

    /// Account `seconds` of foreground time on `domain`.
    ///
    /// The limit notification fires only on the report that crosses the limit,
    /// and the warning at most once per item per day.
    pub fn record_time(&self, domain: &str, seconds: f64) -> Result<TrackOutcome> {
        let domain = normalize_domain(domain);
        if domain.is_empty() || !seconds.is_finite() || seconds <= 0.0 {
            debug!("Ignoring time report of {seconds}s for '{domain}'");
            return Ok(TrackOutcome::default());
        }

        let now = self.clock.now();
        let today = day_string(now);
        let minutes = seconds / 60.0;

        self.store.update::<keys::Insights, _>(|insights| {
            insight::upsert(insights, &domain, &today, minutes);
        })?;

        let mut outcome = self.store.update::<keys::BlockedItems, _>(|items| {
            let mut outcome = TrackOutcome::default();
            for item in items.iter_mut().filter(|item| item.matches_domain(&domain)) {
                let before = item.screen_time_today;
                let after = before + minutes;
                item.screen_time_today = after;

                let Some(limit) = item.daily_limit_minutes else {
                    continue;
                };
                let limit_f = f64::from(limit);
                if before < limit_f && after >= limit_f {
                    outcome.limits_reached.push(limit);
                } else if after >= limit_f * LIMIT_WARNING_RATIO
                    && after < limit_f
                    && item.warning_fired_at.as_deref() != Some(today.as_str())
                {
                    item.warning_fired_at = Some(today.clone());
                    outcome.warnings.push(limit_f - after);
                }
            }
            outcome
        })?;

        if let Some(limit) = outcome.limits_reached.first() {
            info!("Daily limit of {limit} min reached for {domain}");
            self.notifications.alert(Notification::new(
                format!("limit_{domain}"),
                "Daily Limit Reached",
                format!("You've used your {limit} min limit for {domain}. It's now blocked."),
            ));
        }
        if let Some(remaining) = outcome.warnings.first() {
            self.notifications.alert(Notification::new(
                format!("warn_{domain}"),
                "Almost at your limit",
                format!("Only {remaining:.0} min left for {domain} today."),
            ));
        }

        outcome.break_reminder = self.check_break_reminder()?;
        Ok(outcome)
    }

    fn check_break_reminder(&self) -> Result<bool> {
        let interval = self.store.get::<keys::SettingsKey>()?.break_reminder_minutes();
        if interval == 0 {
            return Ok(false);
        }

        let now_ms = self.clock.now_millis();
        let elapsed_minutes = self.store.update::<keys::ContinuousBrowsingStart, _>(|start| {
            match *start {
                None => {
                    *start = Some(now_ms);
                    None
                }
                Some(since) => {
                    let elapsed = (now_ms - since) / MS_PER_MINUTE;
                    if elapsed >= i64::from(interval) {
                        *start = Some(now_ms);
                        Some(elapsed)
                    } else {
                        None
                    }
                }
            }
        })?;

        let Some(elapsed) = elapsed_minutes else {
            return Ok(false);
        };
        self.notifications.alert(Notification::new(
            "break_reminder",
            "Time for a break!",
            format!("You've been browsing for {elapsed} minutes. Take a short break."),
        ));
        Ok(true)
    }

    /// Forget the current continuous browsing stretch.
    pub fn reset_continuous_browsing(&self) -> Result<()> {
        self.store.set::<keys::ContinuousBrowsingStart>(None)
    }

    /// Zero every item's usage once per local day. Returns true if a reset happened.
    pub fn check_daily_reset(&self) -> Result<bool> {
        let today = day_string(self.clock.now());
        if self.store.get::<keys::LastDailyReset>()? == today {
            return Ok(false);
        }

        self.store.update::<keys::BlockedItems, _>(|items| {
            for item in items.iter_mut() {
                item.screen_time_today = 0.0;
            }
        })?;
        self.store.set::<keys::LastDailyReset>(today.clone())?;
        info!("Daily usage reset for {today}");
        Ok(true)
    }

    /// Send today's browsing summary if enabled and not yet sent.
    pub fn send_daily_summary(&self) -> Result<bool> {
        let today = day_string(self.clock.now());
        let storage = self.store.snapshot()?;
        if !storage.settings.daily_summary_enabled
            || storage.last_daily_summary.as_deref() == Some(today.as_str())
        {
            return Ok(false);
        }

        let todays: Vec<_> = storage.insights.iter().filter(|e| e.date == today).collect();
        let Some(top) = todays
            .iter()
            .max_by(|a, b| a.total_minutes.total_cmp(&b.total_minutes))
        else {
            debug!("No browsing recorded today, skipping summary");
            return Ok(false);
        };

        let total: f64 = todays.iter().map(|e| e.total_minutes).sum();
        let limits_hit = storage
            .blocked_items
            .iter()
            .filter(|item| item.is_limited())
            .count();

        self.notifications.alert(Notification::new(
            "daily_summary",
            "Your Daily Summary",
            format!(
                "Total browsing: {}. Top site: {}. Limits hit: {limits_hit}.",
                format_minutes(total),
                top.domain
            ),
        ));
        self.store.set::<keys::LastDailySummary>(Some(today))?;
        Ok(true)
    }
}
