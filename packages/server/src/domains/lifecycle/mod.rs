//! Lifecycle domain - running, settling and cancelling a class
//!
//! Coach-side transitions after booking: `confirmed -> in_progress ->
//! completed`, attendance, payout of earnings, and cancellation with
//! refunds from any non-terminal status.

pub mod activities;

pub use activities::*;
