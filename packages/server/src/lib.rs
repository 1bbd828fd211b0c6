// Coaching session booking engine - core library
//
// Coaches publish bookable slots, students pay for seats with wallet
// credits, and both sides reschedule, cancel and settle through the
// activities in domains/*/activities.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
