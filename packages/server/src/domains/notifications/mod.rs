pub mod activities;
pub mod models;

pub use activities::dispatch;
pub use models::{Notification, NotificationPayload};
