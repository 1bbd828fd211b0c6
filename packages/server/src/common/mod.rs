// Common types shared across the booking domains

pub mod entity_ids;
pub mod errors;
pub mod id;

pub use entity_ids::*;
pub use errors::BookingError;
pub use id::Id;
