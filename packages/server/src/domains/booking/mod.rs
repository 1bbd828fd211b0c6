//! Booking domain - publishing slots and reserving seats
//!
//! Seats are paid for in credits from the student's wallet. Occupancy,
//! enrollment and ledger changes for one request commit together.

pub mod activities;

pub use activities::*;
