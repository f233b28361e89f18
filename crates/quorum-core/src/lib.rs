pub mod error;
pub mod events;
pub mod question;
pub mod registry;
pub mod room;
pub mod vote;

use std::sync::Arc;
use std::time::Duration;

use quorum_db::DbPool;
use quorum_fanout::FanoutClient;
use tokio::sync::Notify;

pub use error::CoreError;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Local broadcast bus; every connection task subscribes and filters by
    /// its bound room.
    pub event_bus: events::RoomEventBus,
    /// Cross-process fan-out and shared presence.
    pub fanout: Arc<FanoutClient>,
    /// Local connection↔room bindings (cache only; the presence store is
    /// authoritative across processes).
    pub registry: Arc<registry::RoomRegistry>,
    /// Per-question serialization for vote toggles.
    pub votes: Arc<vote::VoteToggler>,
    pub config: AppConfig,
    pub shutdown: Arc<Notify>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Worker id baked into generated snowflake IDs.
    pub worker_id: u16,
    /// Presence entries older than this are evicted by the periodic sweep.
    pub presence_stale_max_age: Duration,
    /// Interval between stale-presence sweeps.
    pub presence_sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_id: 1,
            presence_stale_max_age: Duration::from_secs(300),
            presence_sweep_interval: Duration::from_secs(60),
        }
    }
}
