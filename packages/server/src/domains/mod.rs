// Business domains
pub mod booking;
pub mod ledger;
pub mod lifecycle;
pub mod notifications;
pub mod reschedule;
pub mod sessions;
