//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod occ;
pub mod payments;
pub mod scheduled_tasks;
pub mod store;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use payments::DeferredPaymentGateway;
pub use scheduled_tasks::start_scheduler;
pub use store::{
    BookingStore, Change, Changeset, MemoryBookingStore, PgBookingStore, StoreError,
};
pub use stream_hub::StreamHub;
pub use test_dependencies::{FixedClock, MockPaymentGateway, TestDependencies, TestNotifier};
pub use traits::*;
