//! Booking actions - business logic functions
//!
//! Each action runs as an optimistic-concurrency attempt and notifies only
//! after its changeset has committed.

mod book;
mod enrollment;
mod package;
mod publish;

pub use book::{book, BookingResult};
pub use enrollment::{cancel_enrollment, settle_enrollment, EnrollmentCancellation, SettlementResult};
pub use package::{book_package, PackageBookingResult, PackagePayment};
pub use publish::{publish, series_windows, PublishSession, PublishedSession, MAX_SERIES_LENGTH};
