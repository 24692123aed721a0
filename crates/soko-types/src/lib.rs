pub mod api;
pub mod events;
pub mod ids;
pub mod models;

pub use ids::{ChatId, IdParseError, ListingId, MessageId, UserId};
