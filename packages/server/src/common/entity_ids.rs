//! Typed ID definitions for every persisted entity.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker for one calendar occurrence of a session (the unit of booking).
pub struct Occurrence;

/// Marker for a recurring series of occurrences.
pub struct SessionGroup;

/// Marker for a student's binding to one occurrence.
pub struct Enrollment;

/// Marker for marketplace users (coaches and students alike).
pub struct User;

/// Marker for credit wallets.
pub struct Wallet;

/// Marker for ledger transactions.
pub struct Transaction;

/// Marker for notifications handed to the delivery collaborator.
pub struct Notification;

// ============================================================================
// Type aliases
// ============================================================================

pub type OccurrenceId = Id<Occurrence>;

pub type SessionGroupId = Id<SessionGroup>;

pub type EnrollmentId = Id<Enrollment>;

/// Supplied by the identity collaborator and trusted as given.
pub type UserId = Id<User>;

pub type WalletId = Id<Wallet>;

pub type TransactionId = Id<Transaction>;

pub type NotificationId = Id<Notification>;
