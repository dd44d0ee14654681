use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    PageView,
    SessionPing,
}

/// One page view or liveness ping as reported by an instrumented page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub screen_width: u32,
    #[serde(default)]
    pub screen_height: u32,
    #[serde(default)]
    pub page_title: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub is_ping: bool,
}

impl TrackingEvent {
    pub fn page_view(site_id: &str, page: &PageContext, timestamp: DateTime<Utc>) -> Self {
        Self::from_page(site_id, page, timestamp, EventType::PageView)
    }

    pub fn session_ping(site_id: &str, page: &PageContext, timestamp: DateTime<Utc>) -> Self {
        Self::from_page(site_id, page, timestamp, EventType::SessionPing)
    }

    fn from_page(
        site_id: &str,
        page: &PageContext,
        timestamp: DateTime<Utc>,
        event_type: EventType,
    ) -> Self {
        Self {
            site_id: site_id.to_string(),
            url: page.url.clone(),
            referrer: page.referrer.clone(),
            user_agent: page.user_agent.clone(),
            screen_width: page.screen_width,
            screen_height: page.screen_height,
            page_title: page.title.clone(),
            timestamp,
            event_type,
            is_ping: event_type == EventType::SessionPing,
        }
    }

    /// Pings are recognised by either flag so hand-written payloads that only
    /// set one of them are still exempt from duplicate suppression.
    pub fn is_session_ping(&self) -> bool {
        self.is_ping || self.event_type == EventType::SessionPing
    }
}

/// What the tracking client knows about the page it is running in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub referrer: String,
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Dashboard,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackResponse {
    pub fn stored() -> Self {
        Self {
            success: true,
            skipped: None,
            error: None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            success: true,
            skipped: Some(reason),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoredEvents {
    pub sites: BTreeMap<String, Vec<TrackingEvent>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub site_id: String,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

fn default_period_days() -> u32 {
    7
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptQuery {
    pub site_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub url: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPeriod {
    pub days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSummary {
    pub page_views: u64,
    pub unique_visitors: u64,
    pub top_pages: Vec<PageCount>,
    pub current_visitors: u64,
    pub period: SummaryPeriod,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AggregatedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
