pub mod enrollment;
pub mod occurrence;

pub use enrollment::{attendance_status, Enrollment, EnrollmentStatus};
pub use occurrence::{
    ClassKind, Occurrence, OccurrenceStatus, OccurrenceTemplate, Recurrence, Venue,
};
