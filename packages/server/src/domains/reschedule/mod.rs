//! Reschedule domain - coach-proposed time changes
//!
//! A confirmed individual occurrence moves to `rescheduled` until the
//! student accepts (back to `confirmed`), rejects, or lets the response
//! deadline pass. Rejection and expiry both cancel with a full refund.

pub mod activities;
pub mod models;

pub use activities::*;
pub use models::{RescheduleProposal, ResponseDecision};
