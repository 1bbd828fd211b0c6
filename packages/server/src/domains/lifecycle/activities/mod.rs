mod attendance;
mod cancel;
mod payout;
mod transitions;

pub use attendance::submit_attendance;
pub use cancel::{cancel, ClassCancellation};
pub use payout::{payout, payout_reference, PayoutOutcome};
pub use transitions::{earnings_for, end, start, Earnings};
