use crate::models::{AggregatedSummary, EventType, PageCount, SummaryPeriod, TrackingEvent};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};

/// Window, in minutes, used for the "visitors right now" estimate.
pub const ACTIVE_WINDOW_MINUTES: i64 = 5;
/// Upper bound on the active-visitor estimate.
pub const MAX_ACTIVE_VISITORS: u64 = 1_000;
pub const TOP_PAGES_LIMIT: usize = 10;

pub fn summarize(events: &[TrackingEvent], period_days: u32) -> AggregatedSummary {
    summarize_at(Utc::now(), events, period_days)
}

/// Reduces raw events into dashboard metrics for `[now - period_days, now]`.
///
/// User agents stand in for visitor identity; there is no real identity
/// behind `uniqueVisitors` or `currentVisitors`.
pub fn summarize_at(
    now: DateTime<Utc>,
    events: &[TrackingEvent],
    period_days: u32,
) -> AggregatedSummary {
    let start = now - TimeDelta::days(i64::from(period_days));
    let active_since = now - TimeDelta::minutes(ACTIVE_WINDOW_MINUTES);

    let mut page_views = 0u64;
    let mut visitors = HashSet::new();
    let mut active = HashSet::new();
    let mut views_by_url: HashMap<&str, (u64, usize)> = HashMap::new();

    for event in events
        .iter()
        .filter(|event| event.timestamp >= start && event.timestamp <= now)
    {
        visitors.insert(event.user_agent.as_str());
        if event.timestamp >= active_since {
            active.insert(event.user_agent.as_str());
        }

        if event.event_type == EventType::PageView && !event.is_ping {
            page_views += 1;
            let order = views_by_url.len();
            views_by_url.entry(event.url.as_str()).or_insert((0, order)).0 += 1;
        }
    }

    let mut top_pages: Vec<(&str, u64, usize)> = views_by_url
        .into_iter()
        .map(|(url, (views, order))| (url, views, order))
        .collect();
    top_pages.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    top_pages.truncate(TOP_PAGES_LIMIT);

    let unique_visitors = visitors.len() as u64;
    let current_visitors = (active.len() as u64)
        .min(unique_visitors)
        .min(MAX_ACTIVE_VISITORS);

    AggregatedSummary {
        page_views,
        unique_visitors,
        top_pages: top_pages
            .into_iter()
            .map(|(url, views, _)| PageCount {
                url: url.to_string(),
                views,
            })
            .collect(),
        current_visitors,
        period: SummaryPeriod {
            days: period_days,
            start,
            end: now,
        },
    }
}
