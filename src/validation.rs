use log::warn;

use crate::constants::{
    MAX_DAILY_LIMIT_MINUTES, MAX_FOCUS_SESSIONS, MAX_PATTERN_LEN, MAX_PHASE_MINUTES,
    MAX_TEMPORARY_ALLOW_MINUTES,
};
use crate::error::AppError;
use crate::models::{BlockedItem, DayOfWeek, FocusModeConfig, ItemType};
use crate::timeutil::{normalize_domain, parse_hhmm};

/// Validate time format (HH:MM, 24-hour format).
pub fn validate_time_format(time: &str) -> Result<(), AppError> {
    let err = |reason: &str| AppError::InvalidInput {
        field: "time",
        reason: reason.into(),
    };

    if time.len() != 5 || time.get(2..3) != Some(":") {
        return Err(err("must be in HH:MM format"));
    }
    parse_hhmm(time).ok_or_else(|| err("hours must be 00-23 and minutes 00-59"))?;
    Ok(())
}

/// Validate a schedule's day set.
pub fn validate_days(days: &[DayOfWeek]) -> Result<(), AppError> {
    if days.is_empty() {
        return Err(AppError::InvalidInput {
            field: "days",
            reason: "at least one day required".into(),
        });
    }
    Ok(())
}

/// Validate daily limit in minutes.
pub fn validate_daily_limit(minutes: u32) -> Result<(), AppError> {
    if minutes == 0 {
        return Err(AppError::InvalidInput {
            field: "daily_limit_minutes",
            reason: "must be positive".into(),
        });
    }
    if minutes > MAX_DAILY_LIMIT_MINUTES {
        return Err(AppError::InvalidInput {
            field: "daily_limit_minutes",
            reason: "cannot exceed 24 hours".into(),
        });
    }
    Ok(())
}

/// Validate temporary allow duration in minutes.
pub fn validate_temporary_allow_minutes(minutes: u32) -> Result<(), AppError> {
    if minutes == 0 || minutes > MAX_TEMPORARY_ALLOW_MINUTES {
        return Err(AppError::InvalidInput {
            field: "minutes",
            reason: format!("must be between 1 and {MAX_TEMPORARY_ALLOW_MINUTES}"),
        });
    }
    Ok(())
}

/// Validate blocked item pattern.
pub fn validate_pattern(pattern: &str) -> Result<&str, AppError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: "cannot be empty".into(),
        });
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: format!("cannot exceed {MAX_PATTERN_LEN} characters"),
        });
    }
    Ok(pattern)
}

/// Validate focus durations and session count.
pub fn validate_focus_config(config: &FocusModeConfig) -> Result<(), AppError> {
    for (field, minutes) in [
        ("work_minutes", config.work_minutes),
        ("break_minutes", config.break_minutes),
    ] {
        if minutes == 0 || minutes > MAX_PHASE_MINUTES {
            return Err(AppError::InvalidInput {
                field,
                reason: format!("must be between 1 and {MAX_PHASE_MINUTES}"),
            });
        }
    }
    if config.total_sessions == 0 || config.total_sessions > MAX_FOCUS_SESSIONS {
        return Err(AppError::InvalidInput {
            field: "total_sessions",
            reason: format!("must be between 1 and {MAX_FOCUS_SESSIONS}"),
        });
    }
    if config.current_session == 0 || config.current_session > config.total_sessions {
        return Err(AppError::InvalidInput {
            field: "current_session",
            reason: format!("must be between 1 and {}", config.total_sessions),
        });
    }
    Ok(())
}

/// Validate a focus config and normalize its whitelisted domains.
pub fn sanitize_focus_config(mut config: FocusModeConfig) -> Result<FocusModeConfig, AppError> {
    validate_focus_config(&config)?;

    let mut domains: Vec<String> = Vec::with_capacity(config.whitelisted_domains.len());
    for raw in &config.whitelisted_domains {
        let domain = normalize_domain(validate_pattern(raw)?);
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    config.whitelisted_domains = domains;
    Ok(config)
}

/// Normalize blocked items arriving from the extension.
///
/// Domains lose scheme, path and `www.`; keywords are trimmed. A schedule
/// without days becomes no schedule. A schedule with malformed times is dropped
/// with a warning. Out-of-range limits are rejected.
pub fn sanitize_items(items: Vec<BlockedItem>) -> Result<Vec<BlockedItem>, AppError> {
    items.into_iter().map(sanitize_item).collect()
}

fn sanitize_item(mut item: BlockedItem) -> Result<BlockedItem, AppError> {
    let pattern = validate_pattern(&item.url)?;
    item.url = match item.item_type {
        ItemType::Domain => normalize_domain(pattern),
        ItemType::Keyword => pattern.to_string(),
    };
    if item.url.is_empty() {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: "no host in domain".into(),
        });
    }

    if let Some(schedule) = &item.schedule {
        if validate_days(&schedule.days).is_err() {
            item.schedule = None;
        } else if let Err(e) = validate_time_format(&schedule.start_time)
            .and_then(|()| validate_time_format(&schedule.end_time))
        {
            warn!("Dropping schedule of {}: {e}", item.url);
            item.schedule = None;
        }
    }

    if let Some(limit) = item.daily_limit_minutes {
        validate_daily_limit(limit)?;
    }
    if item.screen_time_today.is_nan() || item.screen_time_today < 0.0 {
        item.screen_time_today = 0.0;
    }

    Ok(item)
}
