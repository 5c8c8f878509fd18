//! Turns the persisted policy into the complete rule set for both layers.
//!
//! Compilation is a pure function of the snapshot and the current time, so
//! compiling twice without a state change yields identical output.

use chrono::{DateTime, Local};
use log::warn;
use url::Url;

use super::types::{BlockReason, Rule, RuleAction, RuleCondition, RuleLayer};
use crate::constants::{
    BASE_PRIORITY, FOCUS_ALLOW_PRIORITY, FOCUS_BLOCK_PRIORITY, FOCUS_RULE_OFFSET,
    MAX_ITEM_RULE_ID, WHITELIST_ALLOW_PRIORITY, WHITELIST_CATCHALL_ID,
};
use crate::models::{BlockedItem, FocusModeConfig, ItemType, Settings};
use crate::timeutil::is_schedule_active;

const ANY_SITE: &str = "this site";

/// The parts of the store the compiler reads.
#[derive(Debug, Clone, Copy)]
pub struct PolicySnapshot<'a> {
    pub items: &'a [BlockedItem],
    pub settings: &'a Settings,
    pub focus: &'a FocusModeConfig,
}

impl<'a> From<&'a crate::models::AppStorage> for PolicySnapshot<'a> {
    fn from(storage: &'a crate::models::AppStorage) -> Self {
        Self {
            items: &storage.blocked_items,
            settings: &storage.settings,
            focus: &storage.focus_mode,
        }
    }
}

pub struct CompileContext<'a> {
    pub now: DateTime<Local>,
    pub block_page: &'a Url,
}

/// Full replacement contents of each layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledRules {
    pub persistent: Vec<Rule>,
    pub session: Vec<Rule>,
}

impl CompiledRules {
    pub fn layer(&self, layer: RuleLayer) -> &[Rule] {
        match layer {
            RuleLayer::Dynamic => &self.persistent,
            RuleLayer::Session => &self.session,
        }
    }
}

/// Decide whether an item is blocked right now, and why.
///
/// A live temporary allow exempts the item from everything. Limit-only items
/// block solely on an exceeded limit; other items block when they have no
/// schedule, when their schedule is active, or when their limit is exceeded.
pub fn evaluate_item(item: &BlockedItem, now: DateTime<Local>) -> Option<BlockReason> {
    if item.is_temporarily_allowed(now.timestamp_millis()) {
        return None;
    }

    let limited = item.is_limited();
    let schedule_active = item
        .schedule
        .as_ref()
        .is_some_and(|schedule| is_schedule_active(schedule, now));

    let blocked = if item.limit_only {
        limited
    } else {
        item.schedule.is_none() || schedule_active || limited
    };
    if !blocked {
        return None;
    }

    Some(if limited {
        BlockReason::Limit
    } else if schedule_active {
        BlockReason::Schedule
    } else {
        BlockReason::Blocked
    })
}

/// Block page address carrying the blocked site and the reason.
pub fn block_page_url(base: &Url, site: &str, reason: BlockReason) -> String {
    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("site", site)
        .append_pair("reason", reason.as_str());
    url.into()
}

pub fn compile(policy: PolicySnapshot<'_>, ctx: &CompileContext<'_>) -> CompiledRules {
    if !policy.settings.blocking_enabled {
        return CompiledRules::default();
    }

    let persistent = if policy.settings.whitelist_mode {
        whitelist_rules(policy.items, ctx)
    } else {
        item_rules(policy.items, ctx)
    };

    CompiledRules {
        persistent,
        session: focus_rules(policy.focus, ctx),
    }
}

fn item_condition(item: &BlockedItem) -> RuleCondition {
    match item.item_type {
        ItemType::Keyword => RuleCondition::url_filter(format!("*{}*", item.url)),
        ItemType::Domain => RuleCondition::domain(item.url.clone()),
    }
}

/// Dense IDs from 1, refusing to pass the per-item ceiling.
struct ItemIds {
    next: u32,
    dropped: usize,
}

impl ItemIds {
    fn new() -> Self {
        Self { next: 1, dropped: 0 }
    }

    fn take(&mut self) -> Option<u32> {
        if self.next > MAX_ITEM_RULE_ID {
            self.dropped += 1;
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    fn report(&self) {
        if self.dropped > 0 {
            warn!(
                "Rule ID space exhausted: dropped {} item rule(s) beyond {MAX_ITEM_RULE_ID}",
                self.dropped
            );
        }
    }
}

fn whitelist_rules(items: &[BlockedItem], ctx: &CompileContext<'_>) -> Vec<Rule> {
    let mut rules = vec![Rule {
        id: WHITELIST_CATCHALL_ID,
        priority: BASE_PRIORITY,
        action: RuleAction::redirect_to(block_page_url(
            ctx.block_page,
            ANY_SITE,
            BlockReason::Blocked,
        )),
        condition: RuleCondition::url_filter("*"),
    }];

    let mut ids = ItemIds::new();
    for item in items {
        let Some(id) = ids.take() else { continue };
        rules.push(Rule {
            id,
            priority: WHITELIST_ALLOW_PRIORITY,
            action: RuleAction::Allow,
            condition: item_condition(item),
        });
    }
    ids.report();
    rules
}

fn item_rules(items: &[BlockedItem], ctx: &CompileContext<'_>) -> Vec<Rule> {
    let mut rules = Vec::new();
    let mut ids = ItemIds::new();

    for item in items {
        let Some(reason) = evaluate_item(item, ctx.now) else {
            continue;
        };
        let Some(id) = ids.take() else { continue };
        rules.push(Rule {
            id,
            priority: BASE_PRIORITY,
            action: RuleAction::redirect_to(block_page_url(ctx.block_page, &item.url, reason)),
            condition: item_condition(item),
        });
    }
    ids.report();
    rules
}

fn focus_rules(focus: &FocusModeConfig, ctx: &CompileContext<'_>) -> Vec<Rule> {
    if !focus.is_working() {
        return Vec::new();
    }

    let catch_all = Rule {
        id: FOCUS_RULE_OFFSET,
        priority: FOCUS_BLOCK_PRIORITY,
        action: RuleAction::redirect_to(block_page_url(
            ctx.block_page,
            ANY_SITE,
            BlockReason::Focus,
        )),
        condition: RuleCondition::url_filter("*"),
    };

    std::iter::once(catch_all)
        .chain((FOCUS_RULE_OFFSET + 1..).zip(&focus.whitelisted_domains).map(
            |(id, domain)| Rule {
                id,
                priority: FOCUS_ALLOW_PRIORITY,
                action: RuleAction::Allow,
                condition: RuleCondition::domain(domain.clone()),
            },
        ))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOfWeek, FocusPhase, Schedule};
    use crate::rules::{Decision, MemoryRuleEngine, RuleEngine};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn block_page() -> Url {
        Url::parse("chrome-extension://abc/blocked.html").unwrap()
    }

    // 2026-06-15 is a Monday
    fn monday(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 6, 15, h, m, 0).single().unwrap()
    }

    fn domain(url: &str) -> BlockedItem {
        BlockedItem::new(url, ItemType::Domain, 0)
    }

    fn scheduled(url: &str, start: &str, end: &str) -> BlockedItem {
        let mut item = domain(url);
        item.schedule = Some(Schedule {
            days: DayOfWeek::ALL.to_vec(),
            start_time: start.into(),
            end_time: end.into(),
        });
        item
    }

    fn compile_at(
        items: &[BlockedItem],
        settings: &Settings,
        focus: &FocusModeConfig,
        now: DateTime<Local>,
    ) -> CompiledRules {
        let page = block_page();
        compile(
            PolicySnapshot {
                items,
                settings,
                focus,
            },
            &CompileContext {
                now,
                block_page: &page,
            },
        )
    }

    fn decide(rules: &CompiledRules, target: &str) -> Decision {
        let engine = MemoryRuleEngine::new();
        engine.replace(RuleLayer::Dynamic, &[], &rules.persistent).unwrap();
        engine.replace(RuleLayer::Session, &[], &rules.session).unwrap();
        engine.evaluate(&Url::parse(target).unwrap())
    }

    #[test]
    fn test_plain_item_is_always_blocked() {
        let rules = compile_at(
            &[domain("x.com")],
            &Settings::default(),
            &FocusModeConfig::default(),
            monday(3, 0),
        );

        assert_eq!(rules.persistent.len(), 1);
        let rule = &rules.persistent[0];
        assert_eq!((rule.id, rule.priority), (1, 1));
        assert_eq!(
            rule.action,
            RuleAction::redirect_to("chrome-extension://abc/blocked.html?site=x.com&reason=blocked")
        );
        assert!(rules.session.is_empty());
    }

    #[test]
    fn test_keyword_uses_url_filter() {
        let item = BlockedItem::new("casino", ItemType::Keyword, 0);
        let rules = compile_at(
            &[item],
            &Settings::default(),
            &FocusModeConfig::default(),
            monday(12, 0),
        );

        assert_eq!(rules.persistent[0].condition.url_filter.as_deref(), Some("*casino*"));
        assert!(rules.persistent[0].condition.request_domains.is_none());
    }

    #[test]
    fn test_blocking_disabled_empties_both_layers() {
        let settings = Settings {
            blocking_enabled: false,
            ..Settings::default()
        };
        let focus = FocusModeConfig {
            is_active: true,
            phase: FocusPhase::Work,
            ..FocusModeConfig::default()
        };

        let rules = compile_at(&[domain("x.com")], &settings, &focus, monday(12, 0));

        assert_eq!(rules, CompiledRules::default());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let items = vec![domain("a.com"), scheduled("b.com", "09:00", "17:00")];
        let settings = Settings::default();
        let focus = FocusModeConfig::default();

        let first = compile_at(&items, &settings, &focus, monday(10, 0));
        let second = compile_at(&items, &settings, &focus, monday(10, 0));

        assert_eq!(first, second);
    }

    #[test]
    fn test_schedule_gates_blocking_and_sets_reason() {
        let items = vec![scheduled("x.com", "09:00", "17:00")];
        let settings = Settings::default();
        let focus = FocusModeConfig::default();

        let inside = compile_at(&items, &settings, &focus, monday(10, 0));
        let outside = compile_at(&items, &settings, &focus, monday(18, 0));

        assert!(outside.persistent.is_empty());
        assert_eq!(
            inside.persistent[0].action,
            RuleAction::redirect_to(
                "chrome-extension://abc/blocked.html?site=x.com&reason=schedule"
            )
        );
    }

    #[test]
    fn test_overnight_window_boundaries() {
        let item = scheduled("x.com", "22:00", "06:00");

        assert_eq!(evaluate_item(&item, monday(23, 30)), Some(BlockReason::Schedule));
        assert_eq!(evaluate_item(&item, monday(2, 0)), Some(BlockReason::Schedule));
        assert_eq!(evaluate_item(&item, monday(12, 0)), None);
    }

    #[test]
    fn test_limit_reason_takes_precedence() {
        let mut item = scheduled("x.com", "09:00", "17:00");
        item.daily_limit_minutes = Some(30);
        item.screen_time_today = 30.0;

        assert_eq!(evaluate_item(&item, monday(10, 0)), Some(BlockReason::Limit));
        assert_eq!(evaluate_item(&item, monday(20, 0)), Some(BlockReason::Limit));
    }

    #[test]
    fn test_limit_only_item_ignores_schedule() {
        let mut item = scheduled("x.com", "00:00", "23:59");
        item.limit_only = true;
        item.daily_limit_minutes = Some(60);
        item.screen_time_today = 10.0;

        assert_eq!(evaluate_item(&item, monday(12, 0)), None);

        item.screen_time_today = 60.0;
        assert_eq!(evaluate_item(&item, monday(12, 0)), Some(BlockReason::Limit));
    }

    #[test]
    fn test_temporary_allow_suppresses_then_expires() {
        let now = monday(12, 0);
        let mut item = domain("x.com");
        item.daily_limit_minutes = Some(1);
        item.screen_time_today = 5.0;
        item.temporary_allow_until = Some(now.timestamp_millis() + 60_000);

        assert_eq!(evaluate_item(&item, now), None);
        assert_eq!(
            evaluate_item(&item, monday(12, 1)),
            Some(BlockReason::Limit)
        );
    }

    #[test]
    fn test_whitelist_allows_listed_and_redirects_everything_else() {
        let mut a = scheduled("a.com", "09:00", "10:00");
        a.daily_limit_minutes = Some(1);
        a.screen_time_today = 100.0;
        let items = vec![a, domain("b.com")];
        let settings = Settings {
            whitelist_mode: true,
            ..Settings::default()
        };

        let rules = compile_at(&items, &settings, &FocusModeConfig::default(), monday(9, 30));

        assert_eq!(rules.persistent[0].id, WHITELIST_CATCHALL_ID);
        assert_eq!(decide(&rules, "https://a.com/"), Decision::Allow);
        assert_eq!(decide(&rules, "https://www.b.com/page"), Decision::Allow);
        assert_eq!(
            decide(&rules, "https://c.com/"),
            Decision::Redirect(
                "chrome-extension://abc/blocked.html?site=this+site&reason=blocked".into()
            )
        );
    }

    #[test]
    fn test_focus_work_phase_installs_session_layer() {
        let focus = FocusModeConfig {
            is_active: true,
            phase: FocusPhase::Work,
            whitelisted_domains: vec!["docs.rs".into(), "github.com".into()],
            ..FocusModeConfig::default()
        };

        let rules = compile_at(&[], &Settings::default(), &focus, monday(12, 0));

        let ids: Vec<u32> = rules.session.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10_000, 10_001, 10_002]);
        assert_eq!(rules.session[0].priority, FOCUS_BLOCK_PRIORITY);
        assert_eq!(rules.session[1].priority, FOCUS_ALLOW_PRIORITY);
        assert_eq!(decide(&rules, "https://docs.rs/serde"), Decision::Allow);
        assert!(matches!(decide(&rules, "https://x.com/"), Decision::Redirect(_)));

        let on_break = FocusModeConfig {
            phase: FocusPhase::Break,
            ..focus
        };
        assert!(compile_at(&[], &Settings::default(), &on_break, monday(12, 0))
            .session
            .is_empty());
    }

    #[test]
    fn test_focus_outranks_item_rules() {
        let focus = FocusModeConfig {
            is_active: true,
            phase: FocusPhase::Work,
            whitelisted_domains: vec!["x.com".into()],
            ..FocusModeConfig::default()
        };

        let rules = compile_at(&[domain("x.com")], &Settings::default(), &focus, monday(12, 0));

        assert_eq!(decide(&rules, "https://x.com/"), Decision::Allow);
    }

    #[test]
    fn test_no_allow_and_block_overlap_within_a_tier() {
        let mut limited = scheduled("c.com", "08:00", "09:00");
        limited.daily_limit_minutes = Some(5);
        limited.screen_time_today = 9.0;
        let items = vec![
            domain("a.com"),
            scheduled("b.com", "09:00", "17:00"),
            limited,
            BlockedItem::new("porn", ItemType::Keyword, 0),
        ];
        let focus = FocusModeConfig {
            is_active: true,
            phase: FocusPhase::Work,
            whitelisted_domains: vec!["a.com".into()],
            ..FocusModeConfig::default()
        };

        for whitelist_mode in [false, true] {
            let settings = Settings {
                whitelist_mode,
                ..Settings::default()
            };
            let rules = compile_at(&items, &settings, &focus, monday(10, 0));

            let mut seen = HashSet::new();
            for rule in rules.persistent.iter().chain(&rules.session) {
                assert!(seen.insert(rule.id), "duplicate rule id {}", rule.id);
            }

            let all: Vec<&Rule> = rules.persistent.iter().chain(&rules.session).collect();
            for allow in all.iter().filter(|r| r.action.is_allow()) {
                for block in all.iter().filter(|r| !r.action.is_allow()) {
                    if allow.condition == block.condition {
                        assert_ne!(allow.priority, block.priority);
                    }
                }
                let tier_has_block = all
                    .iter()
                    .any(|r| !r.action.is_allow() && r.priority == allow.priority);
                assert!(!tier_has_block, "allow and block share priority {}", allow.priority);
            }
        }
    }

    #[test]
    fn test_item_ids_are_capped() {
        let items: Vec<BlockedItem> = (0..MAX_ITEM_RULE_ID + 3)
            .map(|i| domain(&format!("site{i}.com")))
            .collect();

        let rules = compile_at(&items, &Settings::default(), &FocusModeConfig::default(), monday(1, 0));

        assert_eq!(rules.persistent.len(), 4000);
        assert_eq!(rules.persistent.last().map(|r| r.id), Some(MAX_ITEM_RULE_ID));
    }
}
