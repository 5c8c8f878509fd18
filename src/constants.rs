// src/constants.rs

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: i64 = 60 * 1000;

/// Per-item rule IDs are dense from 1 up to this value (inclusive).
pub const MAX_ITEM_RULE_ID: u32 = 4000;

/// Rule ID of the whitelist-mode catch-all redirect.
pub const WHITELIST_CATCHALL_ID: u32 = 5000;

/// First rule ID of the focus-session layer; allow rules follow it.
pub const FOCUS_RULE_OFFSET: u32 = 10_000;

/// Priority shared by every per-item block rule and the whitelist catch-all.
pub const BASE_PRIORITY: u32 = 1;

/// Priority of whitelist-mode allow rules.
pub const WHITELIST_ALLOW_PRIORITY: u32 = 2;

/// Priority of the focus-session catch-all redirect.
pub const FOCUS_BLOCK_PRIORITY: u32 = 3;

/// Priority of focus-session allow rules.
pub const FOCUS_ALLOW_PRIORITY: u32 = 4;

/// Number of days ahead the schedule planner arms boundaries for.
pub const PLANNER_HORIZON_DAYS: u32 = 7;

/// Share of a daily limit at which the warning notification fires.
pub const LIMIT_WARNING_RATIO: f64 = 0.8;

/// Break reminder interval used when the setting is absent.
pub const DEFAULT_BREAK_REMINDER_MINUTES: u32 = 30;

/// Wrong password attempts before the gate locks.
pub const MAX_PASSWORD_ATTEMPTS: u32 = 5;

/// Length of the password lockout window in minutes.
pub const LOCKOUT_MINUTES: i64 = 10;

/// Maximum work or break phase length in minutes (12 hours)
pub const MAX_PHASE_MINUTES: u32 = 12 * 60;

/// Maximum number of work sessions in one focus run
pub const MAX_FOCUS_SESSIONS: u32 = 24;

/// Maximum daily limit in minutes (24 hours)
pub const MAX_DAILY_LIMIT_MINUTES: u32 = 24 * 60;

/// Maximum temporary allow in minutes (24 hours)
pub const MAX_TEMPORARY_ALLOW_MINUTES: u32 = 24 * 60;

/// Maximum blocked item pattern length
pub const MAX_PATTERN_LEN: usize = 500;

/// Chrome limits native messaging to 1MB (1024 * 1024 bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// Timer names and prefixes
pub const TIMER_DAILY_RESET: &str = "daily_reset";
pub const TIMER_DAILY_SUMMARY: &str = "daily_summary";
pub const TIMER_FOCUS_PHASE_END: &str = "focus_phase_end";
pub const TIMER_SCHEDULE_PREFIX: &str = "schedule_";
pub const TIMER_BYPASS_PREFIX: &str = "bypass_end_";
