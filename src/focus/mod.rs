//! Pomodoro focus sessions: `idle -> work -> break -> work -> ... -> idle`.
//!
//! Transitions are pure functions over [`FocusModeConfig`]; [`FocusManager`]
//! persists them, keeps exactly one `focus_phase_end` timer armed while a
//! session runs, and announces each transition. Rule rebuilds follow from the
//! store change feed.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::constants::{MS_PER_MINUTE, TIMER_FOCUS_PHASE_END};
use crate::error::{AppError, Result};
use crate::models::{FocusModeConfig, FocusPhase};
use crate::notify::{FocusBroadcaster, Notification, Notifications};
use crate::safe_lock;
use crate::store::{keys, PolicyStore};
use crate::timers::TimerRegistry;
use crate::timeutil::from_millis;
use crate::validation::validate_focus_config;

/// Side effects of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub notification: Notification,
    /// When the next phase ends; None once the session is over.
    pub phase_ends_at: Option<i64>,
}

fn minutes_ms(minutes: u32) -> i64 {
    i64::from(minutes) * MS_PER_MINUTE
}

/// Begin session 1 of a new run.
pub fn begin(config: &mut FocusModeConfig, now_ms: i64) -> Step {
    let ends = now_ms + minutes_ms(config.work_minutes);
    config.is_active = true;
    config.phase = FocusPhase::Work;
    config.current_session = 1;
    config.started_at = Some(now_ms);
    config.phase_ends_at = Some(ends);

    Step {
        notification: Notification::new(
            "focus_start",
            "Focus Session Started",
            format!("{} min work session. Stay focused!", config.work_minutes),
        ),
        phase_ends_at: Some(ends),
    }
}

/// End the session and return to idle.
pub fn halt(config: &mut FocusModeConfig) {
    config.is_active = false;
    config.phase = FocusPhase::Idle;
    config.current_session = 1;
    config.started_at = None;
    config.phase_ends_at = None;
}

/// Move past the phase that just ended. None when no session is running.
pub fn advance(config: &mut FocusModeConfig, now_ms: i64) -> Option<Step> {
    if !config.is_active {
        return None;
    }

    match config.phase {
        FocusPhase::Idle => None,
        FocusPhase::Work => {
            let ends = now_ms + minutes_ms(config.break_minutes);
            config.phase = FocusPhase::Break;
            config.started_at = Some(now_ms);
            config.phase_ends_at = Some(ends);
            Some(Step {
                notification: Notification::new(
                    "focus_break",
                    "Break Time!",
                    format!(
                        "Session {} complete. Take a {} min break.",
                        config.current_session, config.break_minutes
                    ),
                ),
                phase_ends_at: Some(ends),
            })
        }
        FocusPhase::Break => {
            let next = config.current_session + 1;
            if next > config.total_sessions {
                let total = config.total_sessions;
                halt(config);
                return Some(Step {
                    notification: Notification::new(
                        "focus_done",
                        "Focus Session Complete!",
                        format!("All {total} sessions done. Great work!"),
                    ),
                    phase_ends_at: None,
                });
            }

            let ends = now_ms + minutes_ms(config.work_minutes);
            config.phase = FocusPhase::Work;
            config.current_session = next;
            config.started_at = Some(now_ms);
            config.phase_ends_at = Some(ends);
            Some(Step {
                notification: Notification::new(
                    format!("focus_work_{next}"),
                    "Back to Work",
                    format!("Session {next} of {}. Focus!", config.total_sessions),
                ),
                phase_ends_at: Some(ends),
            })
        }
    }
}

pub struct FocusManager {
    store: PolicyStore,
    timers: Arc<Mutex<TimerRegistry>>,
    notifications: Notifications,
    broadcaster: Arc<FocusBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl FocusManager {
    pub fn new(
        store: PolicyStore,
        timers: Arc<Mutex<TimerRegistry>>,
        notifications: Notifications,
        broadcaster: Arc<FocusBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            timers,
            notifications,
            broadcaster,
            clock,
        }
    }

    pub fn state(&self) -> Result<FocusModeConfig> {
        self.store.get::<keys::FocusMode>()
    }

    pub fn start(&self) -> Result<FocusModeConfig> {
        let now = self.clock.now_millis();
        let (state, step) = self.store.update::<keys::FocusMode, _>(|config| {
            validate_focus_config(config)?;
            let step = begin(config, now);
            Ok::<_, AppError>((config.clone(), step))
        })??;

        info!(
            "Focus session started: {} x {}/{} min",
            state.total_sessions, state.work_minutes, state.break_minutes
        );
        self.apply(&state, Some(step));
        Ok(state)
    }

    pub fn stop(&self) -> Result<FocusModeConfig> {
        let state = self.store.update::<keys::FocusMode, _>(|config| {
            halt(config);
            config.clone()
        })?;

        info!("Focus session stopped");
        self.apply(&state, None);
        Ok(state)
    }

    /// Handle the `focus_phase_end` timer. A firing while idle is ignored.
    pub fn on_phase_end(&self) -> Result<Option<FocusModeConfig>> {
        let now = self.clock.now_millis();
        let outcome = self.store.update::<keys::FocusMode, _>(|config| {
            advance(config, now).map(|step| (config.clone(), step))
        })?;

        let Some((state, step)) = outcome else {
            debug!("Phase end fired without an active focus session");
            safe_lock(&self.timers, "Timers").cancel(TIMER_FOCUS_PHASE_END);
            return Ok(None);
        };

        info!(
            "Focus phase -> {} (session {}/{})",
            state.phase.as_str(),
            state.current_session,
            state.total_sessions
        );
        self.apply(&state, Some(step));
        Ok(Some(state))
    }

    /// Bring the phase timer in line with the persisted session, e.g. after a
    /// restart or an edit of `focusMode` from the extension.
    ///
    /// A deadline already in the past fires on the next tick.
    pub fn restore(&self) -> Result<()> {
        let state = self.state()?;
        let mut timers = safe_lock(&self.timers, "Timers");
        match (state.is_active, state.phase_ends_at.and_then(from_millis)) {
            (true, Some(at)) => {
                debug!("Focus phase timer set for {at}");
                timers.arm(TIMER_FOCUS_PHASE_END, at);
            }
            (true, None) => {
                warn!("Active focus session has no phase end, firing now");
                timers.arm(TIMER_FOCUS_PHASE_END, self.clock.now());
            }
            (false, _) => {
                timers.cancel(TIMER_FOCUS_PHASE_END);
            }
        }
        Ok(())
    }

    fn apply(&self, state: &FocusModeConfig, step: Option<Step>) {
        let phase_end = step
            .as_ref()
            .and_then(|s| s.phase_ends_at)
            .and_then(from_millis);
        {
            let mut timers = safe_lock(&self.timers, "Timers");
            match phase_end {
                Some(at) => timers.arm(TIMER_FOCUS_PHASE_END, at),
                None => {
                    timers.cancel(TIMER_FOCUS_PHASE_END);
                }
            }
        }

        if let Some(step) = step {
            self.notifications.send(step.notification);
        }
        self.broadcaster.broadcast(state);
    }
}
