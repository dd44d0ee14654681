use crate::classifier::UrlClassifier;
use crate::dedupe::DuplicateSuppressor;
use crate::delivery::{DeliveryEngine, DeliveryOutcome};
use crate::identity::SiteIdentity;
use crate::models::{PageContext, SkipReason, TrackingEvent};
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Skipped(SkipReason),
    Delivered(DeliveryOutcome),
}

/// Client-side page-view tracking: classify, suppress repeats, deliver.
///
/// One instance per tracked page session. Dashboard URLs never reach the
/// delivery engine.
pub struct Tracker {
    site: SiteIdentity,
    classifier: UrlClassifier,
    suppressor: DuplicateSuppressor,
    engine: DeliveryEngine,
}

impl Tracker {
    pub fn new(
        site: SiteIdentity,
        classifier: UrlClassifier,
        suppressor: DuplicateSuppressor,
        engine: DeliveryEngine,
    ) -> Self {
        Self {
            site,
            classifier,
            suppressor,
            engine,
        }
    }

    pub async fn track_page_view(&mut self, page: &PageContext, now: DateTime<Utc>) -> TrackOutcome {
        if self.classifier.is_dashboard_url(&page.url) {
            debug!(url = %page.url, "skipping dashboard page");
            return TrackOutcome::Skipped(SkipReason::Dashboard);
        }
        if !self.suppressor.check(&page.url, false, now) {
            debug!(url = %page.url, "skipping duplicate page view");
            return TrackOutcome::Skipped(SkipReason::Duplicate);
        }

        let event = TrackingEvent::page_view(self.site.as_str(), page, now);
        TrackOutcome::Delivered(self.engine.deliver(&event).await)
    }
}
