use crate::errors::AppError;
use crate::models::{StoredEvents, TrackingEvent};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

/// Append-only collection of raw tracking events keyed by site id, written
/// through to a JSON file on every append.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
    data: Arc<Mutex<StoredEvents>>,
}

impl EventStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let data = load_data(&path).await;
        Ok(Self {
            path,
            data: Arc::new(Mutex::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: TrackingEvent) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        debug!(site = %event.site_id, url = %event.url, "storing event");
        let site_id = event.site_id.clone();
        data.sites.entry(site_id.clone()).or_default().push(event);
        if let Err(err) = persist_data(&self.path, &data).await {
            // Keep memory in step with the file so a retry is not double counted.
            if let Some(events) = data.sites.get_mut(&site_id) {
                events.pop();
                if events.is_empty() {
                    data.sites.remove(&site_id);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Events for `site_id` with `since <= timestamp <= until`.
    pub async fn query(
        &self,
        site_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<TrackingEvent> {
        let data = self.data.lock().await;
        data.sites
            .get(site_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.timestamp >= since && event.timestamp <= until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn count(&self, site_id: &str) -> usize {
        let data = self.data.lock().await;
        data.sites.get(site_id).map_or(0, Vec::len)
    }
}

pub async fn load_data(path: &Path) -> StoredEvents {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse event store {}: {err}", path.display());
                StoredEvents::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoredEvents::default(),
        Err(err) => {
            error!("failed to read event store {}: {err}", path.display());
            StoredEvents::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &StoredEvents) -> Result<(), AppError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}
