//! Declarative network-request rules in the browser's JSON shape.

use serde::{Deserialize, Serialize};
use url::Url;

/// Persistence layer a rule is installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLayer {
    /// Survives browser restarts; carries per-item and whitelist rules.
    Dynamic,
    /// Cleared with the browser session; carries focus rules.
    Session,
}

impl RuleLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleLayer::Dynamic => "dynamic",
            RuleLayer::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "main_frame")]
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Redirect { redirect: Redirect },
}

impl RuleAction {
    pub fn redirect_to(url: impl Into<String>) -> Self {
        RuleAction::Redirect {
            redirect: Redirect { url: url.into() },
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, RuleAction::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_domains: Option<Vec<String>>,
    pub resource_types: Vec<ResourceType>,
}

impl RuleCondition {
    pub fn url_filter(filter: impl Into<String>) -> Self {
        Self {
            url_filter: Some(filter.into()),
            request_domains: None,
            resource_types: vec![ResourceType::MainFrame],
        }
    }

    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            url_filter: None,
            request_domains: Some(vec![domain.into()]),
            resource_types: vec![ResourceType::MainFrame],
        }
    }

    /// Whether a top-level navigation to `url` satisfies this condition.
    ///
    /// `requestDomains` matches the domain and its subdomains. `urlFilter`
    /// supports the `*` wildcard and matches case-insensitively.
    pub fn matches(&self, url: &Url) -> bool {
        if let Some(domains) = &self.request_domains {
            let Some(host) = url.host_str() else {
                return false;
            };
            if !domains.iter().any(|d| host_matches(host, d)) {
                return false;
            }
        }
        if let Some(filter) = &self.url_filter {
            if !wildcard_contains(&url.as_str().to_ascii_lowercase(), &filter.to_ascii_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Unanchored match of a `*`-wildcard pattern somewhere inside `text`.
fn wildcard_contains(text: &str, pattern: &str) -> bool {
    let mut rest = text;
    for part in pattern.split('*').filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(pos) => rest = rest.get(pos + part.len()..).unwrap_or(""),
            None => return false,
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

/// Why a navigation was redirected, shown on the block page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Limit,
    Schedule,
    Blocked,
    Focus,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::Limit => "limit",
            BlockReason::Schedule => "schedule",
            BlockReason::Blocked => "blocked",
            BlockReason::Focus => "focus",
        }
    }
}
