mod expire;
mod propose;
mod respond;

pub use expire::{expire_overdue, ExpiredReschedule};
pub use propose::{propose, ProposedReschedule};
pub use respond::{respond, RescheduleResponse};
