pub mod proposal;

pub use proposal::{RescheduleProposal, ResponseDecision};
