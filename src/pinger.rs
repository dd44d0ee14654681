use crate::classifier::UrlClassifier;
use crate::config::DEFAULT_PING_INTERVAL_SECS;
use crate::delivery::{DeliveryEngine, DeliveryOutcome};
use crate::identity::SiteIdentity;
use crate::models::{PageContext, TrackingEvent};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, sleep_until};
use tracing::{debug, warn};

/// Quiet period after the last user input before a ping is considered.
pub const ACTIVITY_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    PageLoad,
    Visible,
    Click,
    Scroll,
    Keypress,
    MouseMove,
}

impl Activity {
    fn is_user_input(self) -> bool {
        matches!(
            self,
            Activity::Click | Activity::Scroll | Activity::Keypress | Activity::MouseMove
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDecision {
    Send,
    TooSoon,
    Dashboard,
}

/// Sends `session_ping` events so the backend can estimate how many visitors
/// are on the site right now.
pub struct SessionPinger {
    site: SiteIdentity,
    interval: Duration,
    last_ping: Option<Instant>,
    classifier: UrlClassifier,
    engine: DeliveryEngine,
}

impl SessionPinger {
    pub fn new(
        site: SiteIdentity,
        interval: Duration,
        classifier: UrlClassifier,
        engine: DeliveryEngine,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!("ping interval must be positive, using {DEFAULT_PING_INTERVAL_SECS}s");
            Duration::from_secs(DEFAULT_PING_INTERVAL_SECS)
        } else {
            interval
        };
        Self {
            site,
            interval,
            last_ping: None,
            classifier,
            engine,
        }
    }

    pub fn evaluate(&self, url: &str, now: Instant) -> PingDecision {
        if self.classifier.is_dashboard_url(url) {
            return PingDecision::Dashboard;
        }
        match self.last_ping {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                PingDecision::TooSoon
            }
            _ => PingDecision::Send,
        }
    }

    pub async fn tick(&mut self, page: &PageContext, now: Instant) -> Option<DeliveryOutcome> {
        let decision = self.evaluate(&page.url, now);
        if decision != PingDecision::Send {
            debug!(url = %page.url, ?decision, "ping not sent");
            return None;
        }

        let event = TrackingEvent::session_ping(self.site.as_str(), page, Utc::now());
        let outcome = self.engine.deliver(&event).await;
        // The gate is read before delivery and written after it. The embedded
        // script has the same shape, so two triggers landing during one slow
        // delivery can both pass the gate there. Extra pings are harmless.
        self.last_ping = Some(now);
        Some(outcome)
    }

    /// Drives the pinger until `shutdown` resolves or the activity channel
    /// closes: once at start, on every interval, immediately on
    /// load/visibility, and after user input has been quiet for
    /// [`ACTIVITY_DEBOUNCE`].
    pub async fn run(
        mut self,
        page: watch::Receiver<PageContext>,
        mut activity: mpsc::Receiver<Activity>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settle_at: Option<Instant> = None;

        loop {
            let deadline = settle_at;
            let settle = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {}
                _ = settle => {
                    settle_at = None;
                }
                received = activity.recv() => match received {
                    None => break,
                    Some(input) if input.is_user_input() => {
                        settle_at = Some(Instant::now() + ACTIVITY_DEBOUNCE);
                        continue;
                    }
                    Some(_) => {}
                },
            }

            let current = page.borrow().clone();
            self.tick(&current, Instant::now()).await;
        }
        debug!("session pinger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryMethod;
    use crate::delivery::testing::{RecordingTransport, chain};
    use std::sync::Arc;

    fn pinger(transport: &Arc<RecordingTransport>, interval: Duration) -> SessionPinger {
        SessionPinger::new(
            SiteIdentity::from("site_ping".to_string()),
            interval,
            UrlClassifier::new(Vec::new(), false),
            DeliveryEngine::new(chain(&[transport]), chain(&[transport])),
        )
    }

    fn page(url: &str) -> PageContext {
        PageContext {
            url: url.to_string(),
            ..PageContext::default()
        }
    }

    #[tokio::test]
    async fn gate_blocks_pings_inside_interval() {
        let transport = RecordingTransport::new(DeliveryMethod::Direct, false);
        let mut pinger = pinger(&transport, Duration::from_secs(30));
        let start = Instant::now();
        let shop = page("https://shop.example.com/products");

        assert_eq!(pinger.evaluate(&shop.url, start), PingDecision::Send);
        assert!(pinger.tick(&shop, start).await.is_some());
        assert_eq!(
            pinger.evaluate(&shop.url, start + Duration::from_secs(29)),
            PingDecision::TooSoon
        );
        assert!(pinger.tick(&shop, start + Duration::from_secs(10)).await.is_none());
        assert!(pinger.tick(&shop, start + Duration::from_secs(30)).await.is_some());

        let seen = transport.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(TrackingEvent::is_session_ping));
    }

    #[tokio::test]
    async fn dashboard_pages_are_never_pinged() {
        let transport = RecordingTransport::new(DeliveryMethod::Direct, false);
        let mut pinger = pinger(&transport, Duration::from_secs(30));

        let decision = pinger.evaluate("https://shop.example.com/analytics", Instant::now());
        assert_eq!(decision, PingDecision::Dashboard);
        assert!(pinger.tick(&page("/dashboard"), Instant::now()).await.is_none());
        assert!(transport.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_pings_on_start_and_each_interval() {
        let transport = RecordingTransport::new(DeliveryMethod::Beacon, false);
        let pinger = pinger(&transport, Duration::from_secs(10));
        let (_page_tx, page_rx) = watch::channel(page("https://shop.example.com/"));
        let (activity_tx, activity_rx) = mpsc::channel(8);

        let handle = tokio::spawn(pinger.run(page_rx, activity_rx, std::future::pending()));

        activity_tx.send(Activity::PageLoad).await.unwrap();
        activity_tx.send(Activity::Click).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.seen().len(), 2);

        drop(activity_tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn user_input_pings_only_after_quiet_period() {
        let transport = RecordingTransport::new(DeliveryMethod::Beacon, false);
        let mut pinger = pinger(&transport, Duration::from_secs(10));
        let shop = page("https://shop.example.com/");
        assert!(pinger.tick(&shop, Instant::now()).await.is_some());

        // Timer ticks now land at 4s (gated), 14s and 24s.
        tokio::time::advance(Duration::from_secs(4)).await;
        let (_page_tx, page_rx) = watch::channel(shop);
        let (activity_tx, activity_rx) = mpsc::channel(8);
        let handle = tokio::spawn(pinger.run(page_rx, activity_rx, std::future::pending()));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(transport.seen().len(), 1);
        activity_tx.send(Activity::Click).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.seen().len(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.seen().len(), 2);

        drop(activity_tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_run_while_activity_is_open() {
        let transport = RecordingTransport::new(DeliveryMethod::Beacon, false);
        let pinger = pinger(&transport, Duration::from_secs(10));
        let (_page_tx, page_rx) = watch::channel(page("https://shop.example.com/"));
        let (activity_tx, activity_rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(pinger.run(page_rx, activity_rx, async move {
            let _ = stop_rx.await;
        }));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.seen().len(), 1);

        stop_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(transport.seen().len(), 1);
        assert!(activity_tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_falls_back_to_default() {
        let transport = RecordingTransport::new(DeliveryMethod::Beacon, false);
        let pinger = pinger(&transport, Duration::ZERO);
        assert_eq!(pinger.interval, Duration::from_secs(DEFAULT_PING_INTERVAL_SECS));

        let (_page_tx, page_rx) = watch::channel(page("https://shop.example.com/"));
        let (activity_tx, activity_rx) = mpsc::channel(8);
        let handle = tokio::spawn(pinger.run(page_rx, activity_rx, std::future::pending()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.seen().len(), 1);

        drop(activity_tx);
        handle.await.unwrap();
    }
}
