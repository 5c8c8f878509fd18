use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusPhase {
    #[default]
    Idle,
    Work,
    Break,
}

impl FocusPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FocusPhase::Idle => "idle",
            FocusPhase::Work => "work",
            FocusPhase::Break => "break",
        }
    }
}

/// Persisted Pomodoro-style focus configuration and live session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusModeConfig {
    pub work_minutes: u32,
    pub break_minutes: u32,
    pub total_sessions: u32,
    /// 1-indexed.
    pub current_session: u32,
    pub is_active: bool,
    pub phase: FocusPhase,
    /// Epoch ms when the current phase began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Epoch ms of the next phase transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_ends_at: Option<i64>,
    /// Reachable during the work phase.
    pub whitelisted_domains: Vec<String>,
}

impl Default for FocusModeConfig {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            break_minutes: 5,
            total_sessions: 4,
            current_session: 1,
            is_active: false,
            phase: FocusPhase::Idle,
            started_at: None,
            phase_ends_at: None,
            whitelisted_domains: Vec::new(),
        }
    }
}

impl FocusModeConfig {
    /// Whether the focus block layer should be installed.
    pub fn is_working(&self) -> bool {
        self.is_active && self.phase == FocusPhase::Work
    }
}
