pub mod blocked_item;
pub mod focus_mode;
pub mod insight;
pub mod settings;

pub use blocked_item::{BlockedItem, DayOfWeek, ItemType, Schedule};
pub use focus_mode::{FocusModeConfig, FocusPhase};
pub use insight::InsightEntry;
pub use settings::{BlockPageMode, CustomBlockPageConfig, PasswordConfig, Settings, Theme};

use serde::{Deserialize, Serialize};

/// Every persisted top-level key, with defaults for anything never written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppStorage {
    pub blocked_items: Vec<BlockedItem>,
    pub insights: Vec<InsightEntry>,
    pub focus_mode: FocusModeConfig,
    pub password: PasswordConfig,
    pub custom_block_page: CustomBlockPageConfig,
    pub settings: Settings,
    /// "YYYY-MM-DD"
    pub last_daily_reset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
    /// Epoch ms when the current continuous browsing stretch began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuous_browsing_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_daily_summary: Option<String>,
}
