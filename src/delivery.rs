//! Best-effort event delivery over an ordered chain of transports.
//!
//! Every transport failure is logged and the next transport gets the same
//! event. The engine never returns an error: callers always receive a
//! [`DeliveryOutcome`] describing which transport, if any, took the event.

use crate::errors::TransportError;
use crate::models::TrackingEvent;
use crate::storage::EventStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Beacon,
    Fetch,
    Pixel,
    Direct,
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeliveryMethod::Beacon => "beacon",
            DeliveryMethod::Fetch => "fetch",
            DeliveryMethod::Pixel => "pixel",
            DeliveryMethod::Direct => "direct",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<DeliveryMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn method(&self) -> DeliveryMethod;

    async fn send(&self, event: &TrackingEvent) -> Result<(), TransportError>;
}

/// Fire-and-forget POST. Success means the request was queued on the
/// runtime, not that the server received it.
pub struct BeaconTransport {
    client: Client,
    endpoint: String,
}

impl BeaconTransport {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for BeaconTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Beacon
    }

    async fn send(&self, event: &TrackingEvent) -> Result<(), TransportError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Unavailable("beacon", err.to_string()))?;
        let request = self.client.post(&self.endpoint).json(event);
        handle.spawn(async move {
            if let Err(err) = request.send().await {
                debug!("beacon request did not complete: {err}");
            }
        });
        Ok(())
    }
}

/// Awaited keep-alive POST with a JSON body. Non-2xx answers are failures.
pub struct FetchTransport {
    client: Client,
    endpoint: String,
}

impl FetchTransport {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for FetchTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Fetch
    }

    async fn send(&self, event: &TrackingEvent) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONNECTION, "keep-alive")
            .json(event)
            .send()
            .await?;
        check_status(response.status())
    }
}

/// GET with the event flattened into the query string. Works where POST or
/// CORS preflights are blocked.
pub struct PixelTransport {
    client: Client,
    endpoint: String,
}

impl PixelTransport {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for PixelTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Pixel
    }

    async fn send(&self, event: &TrackingEvent) -> Result<(), TransportError> {
        let response = self.client.get(&self.endpoint).query(event).send().await?;
        check_status(response.status())
    }
}

/// Writes straight into the event store, skipping HTTP entirely.
pub struct DirectTransport {
    store: EventStore,
}

impl DirectTransport {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Direct
    }

    async fn send(&self, event: &TrackingEvent) -> Result<(), TransportError> {
        self.store
            .append(event.clone())
            .await
            .map_err(|err| TransportError::Store(err.message))
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status(status))
    }
}

/// Ordered transport chains for page views and session pings.
///
/// The ping chain may start with a direct store write while the page-view
/// chain never does; the two are kept separate on purpose.
#[derive(Clone)]
pub struct DeliveryEngine {
    page_view_chain: Vec<Arc<dyn Transport>>,
    ping_chain: Vec<Arc<dyn Transport>>,
}

impl DeliveryEngine {
    pub fn new(page_view_chain: Vec<Arc<dyn Transport>>, ping_chain: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            page_view_chain,
            ping_chain,
        }
    }

    /// beacon → fetch → pixel for page views; `direct` (when a store is
    /// given) followed by the same HTTP chain for pings.
    pub fn http(endpoint: &str, direct: Option<EventStore>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        let http_chain: Vec<Arc<dyn Transport>> = vec![
            Arc::new(BeaconTransport::new(client.clone(), endpoint)),
            Arc::new(FetchTransport::new(client.clone(), endpoint)),
            Arc::new(PixelTransport::new(client, endpoint)),
        ];

        let mut ping_chain: Vec<Arc<dyn Transport>> = Vec::with_capacity(http_chain.len() + 1);
        if let Some(store) = direct {
            ping_chain.push(Arc::new(DirectTransport::new(store)));
        }
        ping_chain.extend(http_chain.iter().cloned());

        Self::new(http_chain, ping_chain)
    }

    pub async fn deliver(&self, event: &TrackingEvent) -> DeliveryOutcome {
        let chain = if event.is_session_ping() {
            &self.ping_chain
        } else {
            &self.page_view_chain
        };

        let mut last_error = None;
        for transport in chain {
            let method = transport.method();
            match transport.send(event).await {
                Ok(()) => {
                    debug!(%method, url = %event.url, "event delivered");
                    return DeliveryOutcome {
                        success: true,
                        method: Some(method),
                        error: None,
                    };
                }
                Err(err) => {
                    debug!(%method, "delivery attempt failed: {err}");
                    last_error = Some(format!("{method}: {err}"));
                }
            }
        }

        let error = last_error.unwrap_or_else(|| "no transports configured".to_string());
        warn!(url = %event.url, "all delivery methods failed: {error}");
        DeliveryOutcome {
            success: false,
            method: None,
            error: Some(error),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingTransport, chain};
    use super::*;
    use crate::models::PageContext;
    use chrono::Utc;

    fn page_view() -> TrackingEvent {
        let page = PageContext {
            url: "https://shop.example.com/cart".into(),
            ..PageContext::default()
        };
        TrackingEvent::page_view("site_1", &page, Utc::now())
    }

    #[tokio::test]
    async fn falls_through_to_next_transport_with_same_payload() {
        let beacon = RecordingTransport::new(DeliveryMethod::Beacon, true);
        let fetch = RecordingTransport::new(DeliveryMethod::Fetch, false);
        let pixel = RecordingTransport::new(DeliveryMethod::Pixel, false);
        let engine = DeliveryEngine::new(chain(&[&beacon, &fetch, &pixel]), Vec::new());

        let event = page_view();
        let outcome = engine.deliver(&event).await;

        assert!(outcome.success);
        assert_eq!(outcome.method, Some(DeliveryMethod::Fetch));
        assert_eq!(beacon.seen(), vec![event.clone()]);
        assert_eq!(fetch.seen(), vec![event]);
        assert!(pixel.seen().is_empty());
    }

    #[tokio::test]
    async fn reports_failure_when_every_transport_fails() {
        let beacon = RecordingTransport::new(DeliveryMethod::Beacon, true);
        let pixel = RecordingTransport::new(DeliveryMethod::Pixel, true);
        let engine = DeliveryEngine::new(chain(&[&beacon, &pixel]), Vec::new());

        let outcome = engine.deliver(&page_view()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.method, None);
        assert!(outcome.error.unwrap().starts_with("pixel"));
    }

    #[tokio::test]
    async fn pings_use_their_own_chain() {
        let direct = RecordingTransport::new(DeliveryMethod::Direct, false);
        let beacon = RecordingTransport::new(DeliveryMethod::Beacon, false);
        let engine = DeliveryEngine::new(chain(&[&beacon]), chain(&[&direct, &beacon]));

        let page = PageContext {
            url: "https://shop.example.com/".into(),
            ..PageContext::default()
        };
        let ping = TrackingEvent::session_ping("site_1", &page, Utc::now());
        let outcome = engine.deliver(&ping).await;

        assert_eq!(outcome.method, Some(DeliveryMethod::Direct));
        assert!(beacon.seen().is_empty());
    }

    #[tokio::test]
    async fn direct_transport_writes_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.json")).await.unwrap();
        let engine = DeliveryEngine::http("http://127.0.0.1:9/api/track", Some(store.clone()));

        let page = PageContext {
            url: "https://shop.example.com/".into(),
            ..PageContext::default()
        };
        let ping = TrackingEvent::session_ping("site_1", &page, Utc::now());
        let outcome = engine.deliver(&ping).await;

        assert_eq!(outcome.method, Some(DeliveryMethod::Direct));
        assert_eq!(store.count("site_1").await, 1);
    }

    #[tokio::test]
    async fn beacon_reports_success_once_queued() {
        let transport = BeaconTransport::new(Client::new(), "http://127.0.0.1:9/api/track");
        assert!(transport.send(&page_view()).await.is_ok());
    }
}
