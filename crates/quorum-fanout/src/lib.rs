//! Cross-process room event fan-out and shared presence, backed by Redis.
//!
//! Every server process publishes room events to `room:{code}` channels and
//! holds one pattern subscription covering all of them. Events carry the
//! publishing process's identifier so subscribers can drop their own echoes.
//! Participant presence lives in per-room Redis hashes with a TTL, making
//! participant counts and lists independent of which process a client
//! happens to be connected to.

mod client;
mod presence;

pub use client::{FanoutClient, FanoutError, HandlerRegistry, ROOM_CHANNEL_PATTERN};
pub use presence::{ParticipantEntry, DEFAULT_STALE_MAX_AGE, PRESENCE_TTL_SECONDS};
