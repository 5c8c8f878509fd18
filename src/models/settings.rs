use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BREAK_REMINDER_MINUTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Global toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Master kill-switch.
    pub blocking_enabled: bool,
    /// Only listed items are reachable; everything else is blocked.
    pub whitelist_mode: bool,
    pub theme: Theme,
    pub show_notifications: bool,
    pub dismissed_suggestions: Vec<String>,
    /// 0 disables the reminder; absent means the default interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_reminder_minutes: Option<u32>,
    pub daily_summary_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blocking_enabled: true,
            whitelist_mode: false,
            theme: Theme::Light,
            show_notifications: true,
            dismissed_suggestions: Vec::new(),
            break_reminder_minutes: None,
            daily_summary_enabled: false,
        }
    }
}

impl Settings {
    pub fn break_reminder_minutes(&self) -> u32 {
        self.break_reminder_minutes
            .unwrap_or(DEFAULT_BREAK_REMINDER_MINUTES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordConfig {
    pub enabled: bool,
    /// SHA-256 lowercase hex, empty if not set.
    pub hash: String,
    pub failed_attempts: u32,
    /// Epoch ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPageMode {
    #[default]
    Default,
    Motivational,
    Minimalist,
    Meme,
    Redirect,
    Custom,
}

/// Appearance of the block page. Stored for the extension, not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomBlockPageConfig {
    pub mode: BlockPageMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_delay: Option<u32>,
}

impl Default for CustomBlockPageConfig {
    fn default() -> Self {
        Self {
            mode: BlockPageMode::Default,
            message: Some("This site is blocked. Stay focused!".to_string()),
            background_color: Some("#FFFFFF".to_string()),
            image_base64: None,
            redirect_url: None,
            redirect_delay: Some(3),
        }
    }
}
