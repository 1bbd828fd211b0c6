//! Sessions domain - occurrences, enrollments and calendar arithmetic
//!
//! Pure building blocks shared by booking, rescheduling and the class
//! lifecycle: the data model, the conflict detector and slot pricing.

pub mod cancellation;
pub mod conflicts;
pub mod models;
pub mod pricing;
pub mod window;

pub use conflicts::{classify, find_conflict, has_overlap, Conflict, OverlapKind};
pub use models::*;
pub use window::TimeWindow;
