pub mod aggregate;
pub mod app;
pub mod classifier;
pub mod config;
pub mod dedupe;
pub mod delivery;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod pinger;
pub mod script;
pub mod state;
pub mod storage;
pub mod tracker;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::EventStore;
