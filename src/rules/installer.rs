//! Replace-all installation of compiled rules into the interception layers.

use log::{debug, error, info};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use url::Url;

use super::compiler::CompiledRules;
use super::types::{Rule, RuleAction, RuleLayer};
use crate::error::{AppError, Result};
use crate::safe_lock;

/// A target that holds installed rules per layer.
pub trait RuleEngine: Send + Sync {
    fn installed_ids(&self, layer: RuleLayer) -> Result<Vec<u32>>;

    /// Remove `remove_ids` and add `add` in one atomic call.
    fn replace(&self, layer: RuleLayer, remove_ids: &[u32], add: &[Rule]) -> Result<()>;

    /// Accept an out-of-band report of the IDs actually installed in `layer`.
    /// Engines that can query their own state ignore it.
    fn record_installed(&self, _layer: RuleLayer, _ids: Vec<u32>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOutcome {
    Installed { removed: usize, added: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReport {
    /// Output matched the last successful install.
    Unchanged,
    Applied {
        dynamic: LayerOutcome,
        session: LayerOutcome,
    },
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        match self {
            InstallReport::Unchanged => true,
            InstallReport::Applied { dynamic, session } => {
                !matches!(dynamic, LayerOutcome::Failed(_))
                    && !matches!(session, LayerOutcome::Failed(_))
            }
        }
    }
}

/// Serializes installs and remembers the last fully installed rule set.
pub struct RuleInstaller {
    engine: Arc<dyn RuleEngine>,
    last: Mutex<Option<CompiledRules>>,
}

impl RuleInstaller {
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self {
            engine,
            last: Mutex::new(None),
        }
    }

    /// Install both layers. A failing layer is logged and does not stop the other.
    pub fn install(&self, compiled: CompiledRules, force: bool) -> InstallReport {
        let mut last = safe_lock(&self.last, "Rule installer");
        if !force && last.as_ref() == Some(&compiled) {
            debug!("Rule set unchanged, skipping install");
            return InstallReport::Unchanged;
        }

        let session = self.install_layer(RuleLayer::Session, compiled.layer(RuleLayer::Session));
        let dynamic = self.install_layer(RuleLayer::Dynamic, compiled.layer(RuleLayer::Dynamic));
        let report = InstallReport::Applied { dynamic, session };

        // A partial install must not suppress the next attempt.
        *last = report.is_success().then_some(compiled);
        report
    }

    /// Adopt the installed IDs reported by the browser and drop the cached set,
    /// so the next install replaces whatever is really there.
    pub fn resync(&self, dynamic: Vec<u32>, session: Vec<u32>) {
        let mut last = safe_lock(&self.last, "Rule installer");
        self.engine.record_installed(RuleLayer::Dynamic, dynamic);
        self.engine.record_installed(RuleLayer::Session, session);
        *last = None;
    }

    fn install_layer(&self, layer: RuleLayer, rules: &[Rule]) -> LayerOutcome {
        let result = self
            .engine
            .installed_ids(layer)
            .and_then(|ids| self.engine.replace(layer, &ids, rules).map(|()| ids.len()));

        match result {
            Ok(removed) => {
                info!(
                    "Installed {} {} rule(s), removed {removed}",
                    rules.len(),
                    layer.as_str()
                );
                LayerOutcome::Installed {
                    removed,
                    added: rules.len(),
                }
            }
            Err(e) => {
                error!("Failed to install {} rules: {e}", layer.as_str());
                LayerOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Outcome of evaluating a navigation against installed rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
    NoMatch,
}

/// In-process rule engine mirroring the browser's evaluation order:
/// highest priority wins, and allow beats redirect on a tie.
#[derive(Default)]
pub struct MemoryRuleEngine {
    layers: Mutex<BTreeMap<RuleLayer, BTreeMap<u32, Rule>>>,
    max_rules: Option<usize>,
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any install that would leave a layer above `max_rules`.
    pub fn with_quota(max_rules: usize) -> Self {
        Self {
            layers: Mutex::default(),
            max_rules: Some(max_rules),
        }
    }

    pub fn rules(&self, layer: RuleLayer) -> Vec<Rule> {
        safe_lock(&self.layers, "Rule engine")
            .get(&layer)
            .map(|rules| rules.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn evaluate(&self, url: &Url) -> Decision {
        let layers = safe_lock(&self.layers, "Rule engine");
        let winner = layers
            .values()
            .flat_map(BTreeMap::values)
            .filter(|rule| rule.condition.matches(url))
            .max_by_key(|rule| (rule.priority, rule.action.is_allow()));

        match winner.map(|rule| &rule.action) {
            None => Decision::NoMatch,
            Some(RuleAction::Allow) => Decision::Allow,
            Some(RuleAction::Redirect { redirect }) => {
                Decision::Redirect(redirect.url.clone())
            }
        }
    }
}

impl RuleEngine for MemoryRuleEngine {
    fn installed_ids(&self, layer: RuleLayer) -> Result<Vec<u32>> {
        Ok(safe_lock(&self.layers, "Rule engine")
            .get(&layer)
            .map(|rules| rules.keys().copied().collect())
            .unwrap_or_default())
    }

    fn replace(&self, layer: RuleLayer, remove_ids: &[u32], add: &[Rule]) -> Result<()> {
        let mut layers = safe_lock(&self.layers, "Rule engine");
        let mut next = layers.get(&layer).cloned().unwrap_or_default();

        for id in remove_ids {
            next.remove(id);
        }
        let mut added = HashSet::new();
        for rule in add {
            if !added.insert(rule.id) || next.contains_key(&rule.id) {
                return Err(AppError::RuleInstall(format!("duplicate rule id {}", rule.id)));
            }
            next.insert(rule.id, rule.clone());
        }
        if let Some(max) = self.max_rules {
            if next.len() > max {
                return Err(AppError::RuleInstall(format!(
                    "{} rules exceed the quota of {max}",
                    next.len()
                )));
            }
        }

        layers.insert(layer, next);
        Ok(())
    }
}
