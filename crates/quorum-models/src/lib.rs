pub mod gateway;
pub mod question;
pub mod user;

pub use question::{Question, RoomSummary};
pub use user::RoomParticipant;
