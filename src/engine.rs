//! The single event-dispatch point.
//!
//! Messages, due timers and the startup pass all run here one at a time under
//! the dispatch lock. Each of them mutates the store; the resulting
//! [`StoreChange`] events are then drained and fanned out to the rule compiler,
//! the schedule planner and the timer registry.

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::categories::block_category;
use crate::clock::Clock;
use crate::constants::{
    MS_PER_MINUTE, TIMER_BYPASS_PREFIX, TIMER_DAILY_RESET, TIMER_DAILY_SUMMARY,
    TIMER_FOCUS_PHASE_END, TIMER_SCHEDULE_PREFIX,
};
use crate::error::{AppError, Result};
use crate::focus::FocusManager;
use crate::models::{
    BlockedItem, CustomBlockPageConfig, FocusModeConfig, InsightEntry, ItemType, Schedule,
    Settings,
};
use crate::native_host::protocol::{IncomingMessage, OutgoingMessage};
use crate::notify::{FocusBroadcaster, Notifications, Notifier};
use crate::password::{set_password, unlock};
use crate::planner;
use crate::rules::{compile, CompileContext, InstallReport, PolicySnapshot, RuleEngine, RuleInstaller};
use crate::safe_lock;
use crate::store::{keys, PolicyStore, StoreChange};
use crate::timers::TimerRegistry;
use crate::timeutil::{from_millis, next_local_hour, next_local_midnight, normalize_domain};
use crate::usage::UsageTracker;
use crate::validation::{sanitize_focus_config, sanitize_items, validate_temporary_allow_minutes};

pub struct EngineOptions {
    /// Base address of the page blocked navigations land on.
    pub block_page: Url,
    /// Local hour at which the daily summary goes out.
    pub daily_summary_hour: u32,
}

/// Follow-up work implied by a batch of store changes.
#[derive(Debug, Default, PartialEq, Eq)]
struct Reactions {
    rebuild: bool,
    /// Schedule boundary and bypass expiry timers.
    item_timers: bool,
    focus_timer: bool,
}

impl Reactions {
    fn from_changes(changes: &[StoreChange]) -> Self {
        let mut reactions = Self::default();
        for change in changes {
            match change {
                StoreChange::BlockedItems { before, after } => {
                    // Usage updates land here too; the installer drops identical output.
                    reactions.rebuild = true;
                    reactions.item_timers |= timer_inputs(before) != timer_inputs(after);
                }
                StoreChange::Settings { before, after } => {
                    reactions.rebuild |= before.blocking_enabled != after.blocking_enabled
                        || before.whitelist_mode != after.whitelist_mode;
                }
                StoreChange::FocusMode { before, after } => {
                    reactions.rebuild |= before.is_working() != after.is_working()
                        || before.whitelisted_domains != after.whitelisted_domains;
                    reactions.focus_timer |= before.is_active != after.is_active
                        || before.phase_ends_at != after.phase_ends_at;
                }
                StoreChange::Other { key } => {
                    debug!("Store key {key} changed");
                }
            }
        }
        reactions
    }
}

/// The item fields that item timers are derived from.
fn timer_inputs(items: &[BlockedItem]) -> Vec<(&str, Option<&Schedule>, Option<i64>)> {
    items
        .iter()
        .map(|item| (item.id.as_str(), item.schedule.as_ref(), item.temporary_allow_until))
        .collect()
}

/// One validated top-level value from an `UPDATE_STORE` message.
enum StoreEdit {
    BlockedItems(Vec<BlockedItem>),
    Insights(Vec<InsightEntry>),
    FocusMode(FocusModeConfig),
    Settings(Settings),
    CustomBlockPage(CustomBlockPageConfig),
    OnboardingCompleted(Option<bool>),
}

fn invalid_key(reason: String) -> AppError {
    AppError::InvalidInput {
        field: "changes",
        reason,
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| invalid_key(format!("{key}: {e}")))
}

impl StoreEdit {
    fn parse(key: &str, value: Value) -> Result<Self> {
        match key {
            "blockedItems" => Ok(StoreEdit::BlockedItems(sanitize_items(decode(key, value)?)?)),
            "insights" => Ok(StoreEdit::Insights(decode(key, value)?)),
            "focusMode" => Ok(StoreEdit::FocusMode(sanitize_focus_config(decode(key, value)?)?)),
            "settings" => Ok(StoreEdit::Settings(decode(key, value)?)),
            "customBlockPage" => Ok(StoreEdit::CustomBlockPage(decode(key, value)?)),
            "onboardingCompleted" => Ok(StoreEdit::OnboardingCompleted(decode(key, value)?)),
            "password" => Err(invalid_key("password is changed with SET_PASSWORD".into())),
            "lastDailyReset" | "lastDailySummary" | "continuousBrowsingStart" => {
                Err(invalid_key(format!("{key} is maintained by the host")))
            }
            _ => Err(invalid_key(format!("unknown key {key}"))),
        }
    }

    fn apply(self, store: &PolicyStore) -> Result<()> {
        match self {
            StoreEdit::BlockedItems(mut items) => store.update::<keys::BlockedItems, _>(|current| {
                carry_usage(current, &mut items);
                *current = items;
            }),
            StoreEdit::Insights(insights) => store.set::<keys::Insights>(insights),
            StoreEdit::FocusMode(config) => store.set::<keys::FocusMode>(config),
            StoreEdit::Settings(settings) => store.set::<keys::SettingsKey>(settings),
            StoreEdit::CustomBlockPage(page) => store.set::<keys::CustomBlockPage>(page),
            StoreEdit::OnboardingCompleted(done) => store.set::<keys::OnboardingCompleted>(done),
        }
    }
}

/// Keep the host-accounted usage of items that survive an edit.
///
/// The extension saves a copy it read earlier, so its usage fields may be
/// stale by the time the edit lands.
fn carry_usage(current: &[BlockedItem], edited: &mut [BlockedItem]) {
    for item in edited.iter_mut() {
        if let Some(known) = current.iter().find(|known| known.id == item.id) {
            item.screen_time_today = known.screen_time_today;
            item.warning_fired_at.clone_from(&known.warning_fired_at);
        }
    }
}

pub struct Engine {
    store: PolicyStore,
    changes: Mutex<Receiver<StoreChange>>,
    dispatch: Mutex<()>,
    timers: Arc<Mutex<TimerRegistry>>,
    installer: RuleInstaller,
    focus: FocusManager,
    usage: UsageTracker,
    broadcaster: Arc<FocusBroadcaster>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        store: PolicyStore,
        rule_engine: Arc<dyn RuleEngine>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        let changes = store.subscribe();
        let timers = Arc::new(Mutex::new(TimerRegistry::new()));
        let broadcaster = Arc::new(FocusBroadcaster::new());
        let notifications = Notifications::new(store.clone(), notifier);

        let focus = FocusManager::new(
            store.clone(),
            Arc::clone(&timers),
            notifications.clone(),
            Arc::clone(&broadcaster),
            Arc::clone(&clock),
        );
        let usage = UsageTracker::new(store.clone(), notifications, Arc::clone(&clock));

        Self {
            store,
            changes: Mutex::new(changes),
            dispatch: Mutex::new(()),
            timers,
            installer: RuleInstaller::new(rule_engine),
            focus,
            usage,
            broadcaster,
            clock,
            options,
        }
    }

    /// Receive every focus transition.
    pub fn subscribe_focus(&self) -> Receiver<FocusModeConfig> {
        self.broadcaster.subscribe()
    }

    /// Startup pass: reset per-launch state, restore timers and install rules
    /// from scratch.
    pub fn start(&self) -> Result<()> {
        let _dispatch = safe_lock(&self.dispatch, "Dispatch");

        self.usage.reset_continuous_browsing()?;
        self.usage.check_daily_reset()?;
        self.focus.restore()?;
        // Everything the queued changes would trigger is recomputed below.
        let skipped = safe_lock(&self.changes, "Store changes").try_iter().count();
        debug!("Skipped {skipped} startup change(s)");

        let items = self.store.get::<keys::BlockedItems>()?;
        self.reschedule(&items);
        self.sync_bypass_timers(&items);
        self.arm_daily_timers();

        let report = self.rebuild_rules(true)?;
        if report.is_success() {
            info!("Engine started");
        } else {
            warn!("Engine started, but the initial rule install failed");
        }
        Ok(())
    }

    /// Handle one request from the extension. Failures become `ERROR` replies.
    pub fn handle(&self, message: IncomingMessage) -> OutgoingMessage {
        let _dispatch = safe_lock(&self.dispatch, "Dispatch");
        let reply = self.dispatch_message(message);
        self.process_changes();

        reply.unwrap_or_else(|e| {
            warn!("Request failed: {e}");
            OutgoingMessage::Error {
                message: e.to_string(),
            }
        })
    }

    /// Fire every timer that is due. Returns the number fired.
    pub fn fire_due_timers(&self) -> usize {
        let _dispatch = safe_lock(&self.dispatch, "Dispatch");
        let due = safe_lock(&self.timers, "Timers").take_due(self.clock.now());

        for name in &due {
            if let Err(e) = self.fire(name) {
                error!("Timer {name} failed: {e}");
            }
        }
        self.process_changes();
        due.len()
    }

    fn dispatch_message(&self, message: IncomingMessage) -> Result<OutgoingMessage> {
        let now_ms = self.clock.now_millis();
        let ack = |ok: bool| OutgoingMessage::Ack { ok };

        match message {
            IncomingMessage::TrackTime { domain, seconds } => {
                self.usage.record_time(&domain, seconds)?;
                Ok(ack(true))
            }
            IncomingMessage::StartFocus => Ok(OutgoingMessage::FocusState {
                state: self.focus.start()?,
            }),
            IncomingMessage::StopFocus => Ok(OutgoingMessage::FocusState {
                state: self.focus.stop()?,
            }),
            IncomingMessage::GetFocusState => Ok(OutgoingMessage::FocusState {
                state: self.focus.state()?,
            }),
            IncomingMessage::RebuildRules => Ok(ack(self.rebuild_rules(true)?.is_success())),
            IncomingMessage::TemporaryAllow { domain, minutes } => {
                Ok(ack(self.temporary_allow(&domain, minutes)? > 0))
            }
            IncomingMessage::UpdateStore { changes } => {
                self.update_store(changes)?;
                Ok(ack(true))
            }
            IncomingMessage::GetStore => {
                let mut storage = self.store.snapshot()?;
                storage.password.hash.clear();
                Ok(OutgoingMessage::StoreSnapshot {
                    store: Box::new(storage),
                })
            }
            IncomingMessage::ResetAll => {
                self.store.reset_all()?;
                info!("All stored data reset to defaults");
                Ok(ack(true))
            }
            IncomingMessage::BlockCategory { category_id } => {
                block_category(&self.store, &category_id, now_ms)?;
                Ok(ack(true))
            }
            IncomingMessage::SetPassword { password } => {
                set_password(&self.store, password.as_deref())?;
                Ok(ack(true))
            }
            IncomingMessage::Unlock { password } => Ok(OutgoingMessage::UnlockResult {
                result: unlock(&self.store, &password, now_ms)?,
            }),
            IncomingMessage::InstalledRules {
                dynamic_rule_ids,
                session_rule_ids,
            } => {
                self.installer.resync(dynamic_rule_ids, session_rule_ids);
                Ok(ack(self.rebuild_rules(true)?.is_success()))
            }
        }
    }

    fn fire(&self, name: &str) -> Result<()> {
        debug!("Timer {name} fired");
        let now = self.clock.now();

        match name {
            TIMER_DAILY_RESET => {
                safe_lock(&self.timers, "Timers").arm(TIMER_DAILY_RESET, next_local_midnight(now));
                self.usage.check_daily_reset()?;
                let items = self.store.get::<keys::BlockedItems>()?;
                self.reschedule(&items);
                // Overnight windows and weekday changes flip without any store change.
                self.rebuild_rules(false)?;
            }
            TIMER_DAILY_SUMMARY => {
                safe_lock(&self.timers, "Timers").arm(
                    TIMER_DAILY_SUMMARY,
                    next_local_hour(now, self.options.daily_summary_hour),
                );
                self.usage.send_daily_summary()?;
            }
            TIMER_FOCUS_PHASE_END => {
                if let Err(e) = self.focus.on_phase_end() {
                    // The timer was consumed; put it back so the next tick retries.
                    if let Err(restore_err) = self.focus.restore() {
                        error!("Could not re-arm the focus timer: {restore_err}");
                    }
                    return Err(e);
                }
            }
            _ if name.starts_with(TIMER_SCHEDULE_PREFIX) || name.starts_with(TIMER_BYPASS_PREFIX) => {
                self.rebuild_rules(false)?;
            }
            _ => warn!("Ignoring unknown timer {name}"),
        }
        Ok(())
    }

    fn temporary_allow(&self, domain: &str, minutes: u32) -> Result<usize> {
        validate_temporary_allow_minutes(minutes)?;
        let until = self.clock.now_millis() + i64::from(minutes) * MS_PER_MINUTE;
        let site = normalize_domain(domain);

        let matched = self.store.update::<keys::BlockedItems, _>(|items| {
            let mut matched = 0;
            for item in items.iter_mut().filter(|item| {
                item.url == domain
                    || (item.item_type == ItemType::Domain && item.matches_domain(&site))
            }) {
                item.temporary_allow_until = Some(until);
                matched += 1;
            }
            matched
        })?;

        if matched == 0 {
            info!("No blocked item matches {domain}, nothing to allow");
        } else {
            info!("Allowed {domain} for {minutes} min");
        }
        Ok(matched)
    }

    /// Validate every key first so a bad key leaves the store untouched.
    fn update_store(&self, changes: serde_json::Map<String, Value>) -> Result<()> {
        let edits = changes
            .into_iter()
            .map(|(key, value)| StoreEdit::parse(&key, value))
            .collect::<Result<Vec<_>>>()?;

        let count = edits.len();
        for edit in edits {
            edit.apply(&self.store)?;
        }
        debug!("Applied {count} store edit(s)");
        Ok(())
    }

    fn process_changes(&self) {
        let changes: Vec<StoreChange> = safe_lock(&self.changes, "Store changes").try_iter().collect();
        if changes.is_empty() {
            return;
        }
        let reactions = Reactions::from_changes(&changes);

        if reactions.item_timers {
            match self.store.get::<keys::BlockedItems>() {
                Ok(items) => {
                    self.reschedule(&items);
                    self.sync_bypass_timers(&items);
                }
                Err(e) => error!("Could not read blocked items to re-arm timers: {e}"),
            }
        }
        if reactions.focus_timer {
            if let Err(e) = self.focus.restore() {
                error!("Could not sync the focus timer: {e}");
            }
        }
        if reactions.rebuild {
            if let Err(e) = self.rebuild_rules(false) {
                error!("Rule rebuild failed: {e}");
            }
        }
    }

    fn rebuild_rules(&self, force: bool) -> Result<InstallReport> {
        let storage = self.store.snapshot()?;
        let ctx = CompileContext {
            now: self.clock.now(),
            block_page: &self.options.block_page,
        };
        let compiled = compile(PolicySnapshot::from(&storage), &ctx);
        Ok(self.installer.install(compiled, force))
    }

    fn reschedule(&self, items: &[BlockedItem]) {
        let armed = planner::reschedule(&mut safe_lock(&self.timers, "Timers"), items, self.clock.now());
        debug!("Armed {armed} schedule boundary timer(s)");
    }

    fn sync_bypass_timers(&self, items: &[BlockedItem]) {
        let now_ms = self.clock.now_millis();
        let mut timers = safe_lock(&self.timers, "Timers");
        timers.cancel_prefix(TIMER_BYPASS_PREFIX);

        for item in items.iter().filter(|item| item.is_temporarily_allowed(now_ms)) {
            if let Some(at) = item.temporary_allow_until.and_then(from_millis) {
                timers.arm(format!("{TIMER_BYPASS_PREFIX}{}", item.id), at);
            }
        }
    }

    fn arm_daily_timers(&self) {
        let now = self.clock.now();
        let mut timers = safe_lock(&self.timers, "Timers");
        timers.arm(TIMER_DAILY_RESET, next_local_midnight(now));
        timers.arm(
            TIMER_DAILY_SUMMARY,
            next_local_hour(now, self.options.daily_summary_hour),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOfWeek, FocusPhase};
    use crate::rules::{Decision, MemoryRuleEngine, RuleLayer};
    use crate::test_utils::{setup_test_store, ManualClock, RecordingNotifier};
    use crate::timeutil::day_string;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        engine: Engine,
        store: PolicyStore,
        rules: Arc<MemoryRuleEngine>,
        clock: Arc<ManualClock>,
        recorder: Arc<RecordingNotifier>,
        dir: TempDir,
    }

    fn fixture_with(items: Vec<BlockedItem>) -> Fixture {
        let (store, dir) = setup_test_store();
        let clock = Arc::new(ManualClock::monday_morning());
        store.set::<keys::BlockedItems>(items).unwrap();
        store.set::<keys::LastDailyReset>(day_string(clock.now())).unwrap();

        let rules = Arc::new(MemoryRuleEngine::new());
        let recorder = Arc::new(RecordingNotifier::default());
        let rule_engine: Arc<dyn RuleEngine> = Arc::<MemoryRuleEngine>::clone(&rules);
        let notifier: Arc<dyn Notifier> = Arc::<RecordingNotifier>::clone(&recorder);
        let shared_clock: Arc<dyn Clock> = Arc::<ManualClock>::clone(&clock);

        let engine = Engine::new(
            store.clone(),
            rule_engine,
            notifier,
            shared_clock,
            EngineOptions {
                block_page: Url::parse("chrome-extension://abc/blocked.html").unwrap(),
                daily_summary_hour: 21,
            },
        );
        engine.start().unwrap();

        Fixture {
            engine,
            store,
            rules,
            clock,
            recorder,
            dir,
        }
    }

    fn domain_item(id: &str, url: &str) -> BlockedItem {
        let mut item = BlockedItem::new(url, ItemType::Domain, 0);
        item.id = id.to_string();
        item
    }

    fn is_blocked(f: &Fixture, url: &str) -> bool {
        matches!(
            f.rules.evaluate(&Url::parse(url).unwrap()),
            Decision::Redirect(_)
        )
    }

    fn deadline(f: &Fixture, name: &str) -> Option<chrono::DateTime<chrono::Local>> {
        safe_lock(&f.engine.timers, "test").deadline(name)
    }

    fn update_store(f: &Fixture, changes: Value) -> OutgoingMessage {
        let Value::Object(changes) = changes else {
            panic!("changes must be an object");
        };
        f.engine.handle(IncomingMessage::UpdateStore { changes })
    }

    #[test]
    fn test_start_installs_rules_and_arms_daily_timers() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);
        let now = f.clock.now();

        assert!(is_blocked(&f, "https://www.x.com/feed"));
        assert!(!is_blocked(&f, "https://docs.rs/"));
        assert_eq!(deadline(&f, TIMER_DAILY_RESET), Some(next_local_midnight(now)));
        assert_eq!(deadline(&f, TIMER_DAILY_SUMMARY), Some(next_local_hour(now, 21)));
    }

    #[test]
    fn test_crossing_limit_blocks_site() {
        let mut item = domain_item("x", "x.com");
        item.daily_limit_minutes = Some(1);
        item.limit_only = true;
        let f = fixture_with(vec![item]);
        assert!(!is_blocked(&f, "https://x.com/"));

        let reply = f.engine.handle(IncomingMessage::TrackTime {
            domain: "x.com".into(),
            seconds: 60.0,
        });

        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        assert!(is_blocked(&f, "https://x.com/"));
        assert_eq!(f.recorder.ids(), vec!["limit_x.com"]);
    }

    #[test]
    fn test_temporary_allow_expires_on_timer() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);

        let reply = f.engine.handle(IncomingMessage::TemporaryAllow {
            domain: "www.x.com".into(),
            minutes: 10,
        });

        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        assert!(!is_blocked(&f, "https://x.com/"));
        assert_eq!(
            deadline(&f, "bypass_end_x"),
            Some(f.clock.now() + Duration::minutes(10))
        );

        f.clock.advance(Duration::minutes(10));
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert!(is_blocked(&f, "https://x.com/"));
    }

    #[test]
    fn test_temporary_allow_without_match() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);

        let reply = f.engine.handle(IncomingMessage::TemporaryAllow {
            domain: "y.com".into(),
            minutes: 10,
        });

        assert_eq!(reply, OutgoingMessage::Ack { ok: false });
        assert!(is_blocked(&f, "https://x.com/"));
    }

    #[test]
    fn test_schedule_boundaries_flip_rules() {
        let mut item = domain_item("x", "x.com");
        item.schedule = Some(Schedule {
            days: vec![DayOfWeek::Mon],
            start_time: "10:00".into(),
            end_time: "11:00".into(),
        });
        let f = fixture_with(vec![item]);
        assert!(!is_blocked(&f, "https://x.com/"));

        f.clock.advance(Duration::hours(1));
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert!(is_blocked(&f, "https://x.com/"));

        f.clock.advance(Duration::hours(1));
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert!(!is_blocked(&f, "https://x.com/"));
    }

    #[test]
    fn test_focus_session_drives_session_layer() {
        let f = fixture_with(vec![]);
        let focus_updates = f.engine.subscribe_focus();

        let OutgoingMessage::FocusState { state } = f.engine.handle(IncomingMessage::StartFocus)
        else {
            panic!("expected focus state");
        };
        assert!(state.is_working());
        assert_eq!(f.rules.rules(RuleLayer::Session).len(), 1);
        assert!(is_blocked(&f, "https://anything.example/"));
        assert_eq!(focus_updates.try_recv().unwrap().phase, FocusPhase::Work);

        f.clock.advance(Duration::minutes(25));
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert!(f.rules.rules(RuleLayer::Session).is_empty());
        assert_eq!(focus_updates.try_recv().unwrap().phase, FocusPhase::Break);

        f.engine.handle(IncomingMessage::StopFocus);
        assert_eq!(deadline(&f, TIMER_FOCUS_PHASE_END), None);
    }

    #[test]
    fn test_update_store_is_all_or_nothing() {
        let f = fixture_with(vec![]);

        let reply = update_store(
            &f,
            serde_json::json!({
                "settings": {"whitelistMode": true},
                "password": {"enabled": false}
            }),
        );

        assert!(matches!(reply, OutgoingMessage::Error { .. }));
        assert!(!f.store.get::<keys::SettingsKey>().unwrap().whitelist_mode);
    }

    #[test]
    fn test_update_store_sanitizes_items_and_rebuilds() {
        let f = fixture_with(vec![]);

        let reply = update_store(
            &f,
            serde_json::json!({
                "blockedItems": [
                    {"id": "r", "url": "https://www.reddit.com/r/rust", "type": "domain", "createdAt": 1}
                ]
            }),
        );

        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        assert_eq!(f.store.get::<keys::BlockedItems>().unwrap()[0].url, "reddit.com");
        assert!(is_blocked(&f, "https://old.reddit.com/"));
    }

    #[test]
    fn test_item_edit_from_stale_copy_keeps_tracked_usage() {
        let mut item = domain_item("x", "x.com");
        item.daily_limit_minutes = Some(60);
        item.limit_only = true;
        let f = fixture_with(vec![item]);
        // The dashboard read the list before this usage was reported.
        let mut saved = f.store.get::<keys::BlockedItems>().unwrap();

        f.engine.handle(IncomingMessage::TrackTime {
            domain: "x.com".into(),
            seconds: 65.0 * 60.0,
        });
        assert!(is_blocked(&f, "https://x.com/"));

        let reply = update_store(&f, serde_json::json!({ "blockedItems": saved.clone() }));
        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        let items = f.store.get::<keys::BlockedItems>().unwrap();
        assert!((items[0].screen_time_today - 65.0).abs() < 1e-9);
        assert!(is_blocked(&f, "https://x.com/"));

        saved[0].daily_limit_minutes = Some(120);
        update_store(&f, serde_json::json!({ "blockedItems": saved }));
        let items = f.store.get::<keys::BlockedItems>().unwrap();
        assert_eq!(items[0].daily_limit_minutes, Some(120));
        assert!((items[0].screen_time_today - 65.0).abs() < 1e-9);
        assert!(!is_blocked(&f, "https://x.com/"));
    }

    #[test]
    fn test_failed_phase_end_rearms_focus_timer() {
        let f = fixture_with(vec![]);
        f.engine.handle(IncomingMessage::StartFocus);
        let conn = rusqlite::Connection::open(f.dir.path().join("test.db")).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER freeze_focus BEFORE UPDATE ON store WHEN OLD.key = 'focusMode'
             BEGIN SELECT RAISE(ABORT, 'focusMode is read-only'); END;",
        )
        .unwrap();

        f.clock.advance(Duration::minutes(25));
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert_eq!(deadline(&f, TIMER_FOCUS_PHASE_END), Some(f.clock.now()));
        assert_eq!(f.store.get::<keys::FocusMode>().unwrap().phase, FocusPhase::Work);

        conn.execute_batch("DROP TRIGGER freeze_focus;").unwrap();
        assert_eq!(f.engine.fire_due_timers(), 1);
        assert_eq!(f.store.get::<keys::FocusMode>().unwrap().phase, FocusPhase::Break);
        assert_eq!(
            deadline(&f, TIMER_FOCUS_PHASE_END),
            Some(f.clock.now() + Duration::minutes(5))
        );
    }

    #[test]
    fn test_kill_switch_clears_both_layers() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);
        f.engine.handle(IncomingMessage::StartFocus);

        let reply = update_store(&f, serde_json::json!({"settings": {"blockingEnabled": false}}));

        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        assert!(f.rules.rules(RuleLayer::Dynamic).is_empty());
        assert!(f.rules.rules(RuleLayer::Session).is_empty());
    }

    #[test]
    fn test_get_store_redacts_password_hash() {
        let f = fixture_with(vec![]);
        f.engine.handle(IncomingMessage::SetPassword {
            password: Some("hunter2".into()),
        });

        let OutgoingMessage::StoreSnapshot { store } = f.engine.handle(IncomingMessage::GetStore)
        else {
            panic!("expected store snapshot");
        };

        assert!(store.password.enabled);
        assert!(store.password.hash.is_empty());
        assert!(!f.store.get::<keys::Password>().unwrap().hash.is_empty());
    }

    #[test]
    fn test_failures_become_error_replies() {
        let f = fixture_with(vec![]);

        let reply = f.engine.handle(IncomingMessage::BlockCategory {
            category_id: "hobbies".into(),
        });

        assert_eq!(
            reply,
            OutgoingMessage::Error {
                message: "Category not found".into()
            }
        );
    }

    #[test]
    fn test_installed_rules_report_forces_reinstall() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);
        // Browser lost its rules behind our back.
        let ids = f.rules.installed_ids(RuleLayer::Dynamic).unwrap();
        f.rules.replace(RuleLayer::Dynamic, &ids, &[]).unwrap();
        assert!(!is_blocked(&f, "https://x.com/"));

        let reply = f.engine.handle(IncomingMessage::InstalledRules {
            dynamic_rule_ids: vec![],
            session_rule_ids: vec![],
        });

        assert_eq!(reply, OutgoingMessage::Ack { ok: true });
        assert!(is_blocked(&f, "https://x.com/"));
    }

    #[test]
    fn test_reset_all_clears_rules_and_focus_timer() {
        let f = fixture_with(vec![domain_item("x", "x.com")]);
        f.engine.handle(IncomingMessage::StartFocus);

        assert_eq!(f.engine.handle(IncomingMessage::ResetAll), OutgoingMessage::Ack { ok: true });

        assert!(!is_blocked(&f, "https://x.com/"));
        assert!(f.rules.rules(RuleLayer::Session).is_empty());
        assert_eq!(deadline(&f, TIMER_FOCUS_PHASE_END), None);
    }

    #[test]
    fn test_midnight_resets_usage_and_rearms() {
        let mut item = domain_item("x", "x.com");
        item.daily_limit_minutes = Some(30);
        item.limit_only = true;
        item.screen_time_today = 45.0;
        let f = fixture_with(vec![item]);
        assert!(is_blocked(&f, "https://x.com/"));

        let midnight = next_local_midnight(f.clock.now());
        f.clock.set(midnight);

        // daily_summary at 21:00 and daily_reset at midnight
        assert_eq!(f.engine.fire_due_timers(), 2);
        assert!(!is_blocked(&f, "https://x.com/"));
        assert_eq!(
            deadline(&f, TIMER_DAILY_RESET),
            Some(next_local_midnight(midnight))
        );
    }

    #[test]
    fn test_usage_only_changes_do_not_replan() {
        let before = vec![domain_item("x", "x.com")];
        let mut after = before.clone();
        after[0].screen_time_today = 5.0;

        let reactions = Reactions::from_changes(&[StoreChange::BlockedItems { before, after }]);

        assert_eq!(
            reactions,
            Reactions {
                rebuild: true,
                ..Reactions::default()
            }
        );
    }

    #[test]
    fn test_carry_usage_matches_by_id() {
        let mut tracked = domain_item("x", "x.com");
        tracked.screen_time_today = 30.0;
        tracked.warning_fired_at = Some("2026-06-15".into());
        let mut edited = vec![domain_item("x", "x.com"), domain_item("y", "y.com")];
        edited[1].screen_time_today = 3.0;

        carry_usage(&[tracked], &mut edited);

        assert!((edited[0].screen_time_today - 30.0).abs() < 1e-9);
        assert_eq!(edited[0].warning_fired_at.as_deref(), Some("2026-06-15"));
        assert!((edited[1].screen_time_today - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_settings_do_not_rebuild() {
        let before = Settings::default();
        let after = Settings {
            show_notifications: false,
            ..Settings::default()
        };

        let reactions = Reactions::from_changes(&[
            StoreChange::Settings { before, after },
            StoreChange::Other { key: "insights" },
        ]);

        assert_eq!(reactions, Reactions::default());
    }
}
