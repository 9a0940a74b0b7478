use serde::{Deserialize, Serialize};

use crate::daykey;

pub const KIND_INCLUDED_IN_PRO: &str = "USAGE_EVENT_KIND_INCLUDED_IN_PRO";
pub const KIND_INCLUDED_IN_ULTRA: &str = "USAGE_EVENT_KIND_INCLUDED_IN_ULTRA";
pub const KIND_USAGE_BASED: &str = "USAGE_EVENT_KIND_USAGE_BASED";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

// One calendar day of aggregate counters. The feed omits counters that are
// zero, so every numeric field defaults to 0 on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyMetric {
    pub date: String,
    pub active_users: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub accepted_lines_added: u64,
    pub accepted_lines_deleted: u64,
    pub total_applies: u64,
    pub total_accepts: u64,
    pub total_rejects: u64,
    pub total_tabs_shown: u64,
    pub total_tabs_accepted: u64,
    pub agent_requests: u64,
    pub subscription_included_reqs: u64,
    pub usage_based_reqs: u64,
    pub chat_requests: u64,
    pub cmdk_usages: u64,
    pub model_usage: Vec<NamedCount>,
    pub extension_usage: Vec<NamedCount>,
    pub tab_extension_usage: Vec<NamedCount>,
    pub client_version_usage: Vec<NamedCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsPeriod {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsData {
    pub daily_metrics: Vec<DailyMetric>,
    pub period: AnalyticsPeriod,
    pub total_members_in_team: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_cents: Option<f64>,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_write_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEventKind {
    IncludedInPro,
    IncludedInUltra,
    UsageBased,
    Unrecognized,
}

impl UsageEventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            KIND_INCLUDED_IN_PRO => Self::IncludedInPro,
            KIND_INCLUDED_IN_ULTRA => Self::IncludedInUltra,
            KIND_USAGE_BASED => Self::UsageBased,
            _ => Self::Unrecognized,
        }
    }

    pub fn is_subscription(self) -> bool {
        matches!(self, Self::IncludedInPro | Self::IncludedInUltra)
    }

    pub fn is_usage_based(self) -> bool {
        matches!(self, Self::UsageBased)
    }
}

// One model invocation from the usage-events feed. The timestamp arrives as
// an epoch-milliseconds string; `kind` is kept verbatim so cached snapshots
// round-trip tags this build does not recognize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageEvent {
    pub timestamp: String,
    pub model: String,
    pub kind: String,
    pub is_token_based_call: bool,
    pub token_usage: Option<TokenUsage>,
    pub owning_user: String,
}

impl UsageEvent {
    pub fn billing_kind(&self) -> UsageEventKind {
        UsageEventKind::from_tag(&self.kind)
    }

    pub fn epoch_ms(&self) -> Option<i64> {
        daykey::parse_epoch_ms(&self.timestamp)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageEventsPage {
    pub total_usage_events_count: u64,
    pub usage_events_display: Vec<UsageEvent>,
}
