use crate::classifier::UrlClassifier;
use crate::config::Config;
use crate::dedupe::DuplicateSuppressor;
use crate::storage::EventStore;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: EventStore,
    pub classifier: Arc<UrlClassifier>,
    pub suppressor: Arc<Mutex<DuplicateSuppressor>>,
}

impl AppState {
    pub fn new(config: Config, store: EventStore) -> Self {
        let classifier = UrlClassifier::new(config.dashboard_hosts.clone(), config.allow_local);
        let suppressor = DuplicateSuppressor::new(config.dedupe_window);
        Self {
            config: Arc::new(config),
            store,
            classifier: Arc::new(classifier),
            suppressor: Arc::new(Mutex::new(suppressor)),
        }
    }
}
