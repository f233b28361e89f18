use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

use quorum_models::gateway::{EventKind, FanoutMessage};

/// Pattern covering every per-room channel.
pub const ROOM_CHANNEL_PATTERN: &str = "room:*";

/// Outbound publish queue depth. Events are dropped with a warning when the
/// queue is full (e.g. during a prolonged Redis outage); fan-out is
/// best-effort, not transactional.
const PUBLISH_QUEUE_CAPACITY: usize = 4096;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;

pub(crate) fn room_channel(room_code: &str) -> String {
    format!("room:{room_code}")
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

type Handler = Box<dyn Fn(FanoutMessage) + Send + Sync>;

/// Dispatch table from event kind to handler, populated once at startup.
/// Incoming messages whose kind has no registered handler are dropped with a
/// debug log; a message that fails to parse at all (including unknown
/// `type` values) is ignored.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(FanoutMessage) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Invoke the handler registered for the message's kind. Returns whether
    /// a handler was found.
    pub fn dispatch(&self, message: FanoutMessage) -> bool {
        match self.handlers.get(&message.kind) {
            Some(handler) => {
                handler(message);
                true
            }
            None => {
                tracing::debug!(kind = message.kind.as_str(), "no fan-out handler registered");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Per-process client for the shared presence store and pub/sub backbone.
///
/// One instance per server process. Publishing is queued through an
/// in-process channel drained by a background task, so callers never wait on
/// Redis; delivery to local connections must not depend on it.
pub struct FanoutClient {
    pub(crate) client: RedisClient,
    pub(crate) conn: ConnectionManager,
    origin_process_id: String,
    publish_tx: mpsc::Sender<FanoutMessage>,
}

impl FanoutClient {
    /// Connect with an auto-generated origin identifier.
    pub async fn connect(redis_url: &str) -> Result<Self, FanoutError> {
        let origin = format!(
            "server-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        );
        Self::connect_with_origin(redis_url, origin).await
    }

    /// Connect with an explicit origin identifier (used by tests simulating
    /// multiple processes against one store).
    pub async fn connect_with_origin(
        redis_url: &str,
        origin_process_id: String,
    ) -> Result<Self, FanoutError> {
        let client = RedisClient::open(redis_url)?;
        let conn = client.get_connection_manager().await?;

        let (publish_tx, publish_rx) = mpsc::channel(PUBLISH_QUEUE_CAPACITY);
        tokio::spawn(run_publisher(conn.clone(), publish_rx));

        tracing::info!(origin = %origin_process_id, "fan-out client connected");
        Ok(Self {
            client,
            conn,
            origin_process_id,
            publish_tx,
        })
    }

    pub fn origin_process_id(&self) -> &str {
        &self.origin_process_id
    }

    /// Liveness probe against the backing store.
    pub async fn ping(&self) -> Result<(), FanoutError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Queue an event for publication on the room's channel. Never blocks;
    /// a full or closed queue drops the event with a warning.
    pub fn publish(&self, room_code: &str, kind: EventKind, data: serde_json::Value) {
        let message = FanoutMessage {
            kind,
            room_code: room_code.to_string(),
            data,
            origin_process_id: self.origin_process_id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(err) = self.publish_tx.try_send(message) {
            tracing::warn!(
                room_code,
                kind = kind.as_str(),
                error = %err,
                "dropping fan-out publish"
            );
        }
    }

    /// Whether an incoming message is this process's own publication coming
    /// back around. Such echoes were already applied locally before
    /// publishing and must not be delivered twice.
    pub fn is_self_echo(&self, message: &FanoutMessage) -> bool {
        message.origin_process_id == self.origin_process_id
    }

    /// Spawn the subscriber task: one pattern subscription over all room
    /// channels, reconnecting with exponential backoff, dispatching each
    /// non-echo message through the registry.
    pub fn spawn_subscriber(
        self: &Arc<Self>,
        registry: HandlerRegistry,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff_secs = INITIAL_BACKOFF_SECS;
            loop {
                match this.run_subscriber(&registry).await {
                    SubscriberExit::Disconnected => {
                        // The connection was healthy before it dropped; retry
                        // promptly.
                        backoff_secs = INITIAL_BACKOFF_SECS;
                        tracing::error!(
                            backoff_secs,
                            "fan-out subscriber stream ended, reconnecting"
                        );
                    }
                    SubscriberExit::ConnectFailed(err) => {
                        tracing::error!(
                            error = %err,
                            backoff_secs,
                            "fan-out subscriber failed to connect, retrying"
                        );
                    }
                }
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
            }
        })
    }

    async fn run_subscriber(&self, registry: &HandlerRegistry) -> SubscriberExit {
        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(ps) => ps,
            Err(err) => return SubscriberExit::ConnectFailed(err),
        };
        if let Err(err) = pubsub.psubscribe(ROOM_CHANNEL_PATTERN).await {
            return SubscriberExit::ConnectFailed(err);
        }
        tracing::info!(
            pattern = ROOM_CHANNEL_PATTERN,
            origin = %self.origin_process_id,
            "fan-out subscriber listening"
        );

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!(channel = %channel, error = %err, "invalid fan-out payload");
                    continue;
                }
            };

            // Unknown event kinds fail to parse here and are skipped, not
            // fatal.
            let message = match serde_json::from_str::<FanoutMessage>(&payload) {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(channel = %channel, error = %err, "unparseable fan-out message");
                    continue;
                }
            };

            if self.is_self_echo(&message) {
                tracing::trace!(channel = %channel, "suppressing self-echo");
                continue;
            }

            tracing::debug!(
                channel = %channel,
                kind = message.kind.as_str(),
                origin = %message.origin_process_id,
                "fan-out message received"
            );
            registry.dispatch(message);
        }

        SubscriberExit::Disconnected
    }
}

enum SubscriberExit {
    /// Connected and then the stream ended (Redis went away).
    Disconnected,
    /// Could not connect or subscribe at all.
    ConnectFailed(redis::RedisError),
}

async fn run_publisher(mut conn: ConnectionManager, mut rx: mpsc::Receiver<FanoutMessage>) {
    while let Some(message) = rx.recv().await {
        let channel = room_channel(&message.room_code);
        let payload = match serde_json::to_string(&message) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(channel = %channel, error = %err, "failed to serialize fan-out message");
                continue;
            }
        };
        // Best-effort: a failed publish is logged and swallowed, the
        // ConnectionManager reconnects on its own.
        match conn.publish::<_, _, i64>(&channel, &payload).await {
            Ok(receivers) => {
                tracing::debug!(
                    channel = %channel,
                    kind = message.kind.as_str(),
                    receivers,
                    "published fan-out message"
                );
            }
            Err(err) => {
                tracing::warn!(channel = %channel, error = %err, "failed to publish fan-out message");
            }
        }
    }
}
