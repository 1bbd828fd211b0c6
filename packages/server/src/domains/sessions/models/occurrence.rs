use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::fmt;

use crate::common::{BookingError, OccurrenceId, SessionGroupId, UserId};
use crate::domains::sessions::pricing::slot_pricing;
use crate::domains::sessions::window::TimeWindow;

// =============================================================================
// Enums
// =============================================================================

/// Occurrence lifecycle.
///
/// ```text
/// published ─► pubcon ─► confirmed ─► in_progress ─► completed
///      │          │  ▲        │  ▲
///      │          ▼  │        ▼  │
///      │        rescheduled ◄─┘  │ (accept)
///      └──────────► cancelled ◄──┘ (from any non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "occurrence_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Published,
    /// Group occurrence with some, but not all, seats taken.
    Pubcon,
    Confirmed,
    /// Coach moved the slot; waiting on the enrolled student's answer.
    Rescheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl OccurrenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceStatus::Published => "published",
            OccurrenceStatus::Pubcon => "pubcon",
            OccurrenceStatus::Confirmed => "confirmed",
            OccurrenceStatus::Rescheduled => "rescheduled",
            OccurrenceStatus::InProgress => "in_progress",
            OccurrenceStatus::Completed => "completed",
            OccurrenceStatus::Cancelled => "cancelled",
        }
    }

    /// Still holds a slot on the coach's calendar.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OccurrenceStatus::Completed | OccurrenceStatus::Cancelled)
    }

    pub fn is_bookable(&self) -> bool {
        matches!(self, OccurrenceStatus::Published | OccurrenceStatus::Pubcon)
    }
}

impl fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "class_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Individual,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recurrence", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    Once,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Venue {
    #[sqlx(rename = "venue_address")]
    pub address: String,
    #[sqlx(rename = "venue_postal_code")]
    pub postal_code: String,
}

impl Venue {
    pub fn new(address: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            postal_code: postal_code.into(),
        }
    }
}

// =============================================================================
// Occurrence
// =============================================================================

/// One bookable calendar instance of a coach's session.
///
/// `version` is bumped on every committed update and checked by the store,
/// so concurrent read-modify-write of occupancy never loses an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub session_group_id: SessionGroupId,
    pub coach_id: UserId,
    pub activity: String,
    #[sqlx(rename = "session_date")]
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub day_of_week: i32,
    #[sqlx(flatten)]
    pub venue: Venue,
    pub kind: ClassKind,
    pub recurrence: Recurrence,
    pub max_students: i32,
    pub students_attending: i32,
    /// List price of this occurrence, before credit conversion.
    pub price: Decimal,
    pub price_per_hour: Decimal,
    pub description: String,
    pub status: OccurrenceStatus,
    /// Set while `rescheduled`: the student must answer before this instant.
    pub response_deadline: Option<NaiveDateTime>,
    pub paid_out: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a coach supplies when publishing; the window comes separately so
/// a recurring series can stamp one template onto many dates.
#[derive(Debug, Clone)]
pub struct OccurrenceTemplate {
    pub session_group_id: SessionGroupId,
    pub coach_id: UserId,
    pub activity: String,
    pub venue: Venue,
    pub kind: ClassKind,
    pub recurrence: Recurrence,
    pub max_students: i32,
    pub price: Decimal,
    pub description: String,
}

impl Occurrence {
    pub fn published(template: &OccurrenceTemplate, window: TimeWindow, now: DateTime<Utc>) -> Self {
        let pricing = slot_pricing(&window, template.price);
        Self {
            id: OccurrenceId::new(),
            session_group_id: template.session_group_id,
            coach_id: template.coach_id,
            activity: template.activity.clone(),
            date: window.date,
            start_time: window.start,
            end_time: window.end,
            duration_minutes: pricing.duration_minutes,
            day_of_week: pricing.day_of_week,
            venue: template.venue.clone(),
            kind: template.kind,
            recurrence: template.recurrence,
            max_students: template.max_students,
            students_attending: 0,
            price: template.price,
            price_per_hour: pricing.price_per_hour,
            description: template.description.clone(),
            status: OccurrenceStatus::Published,
            response_deadline: None,
            paid_out: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            date: self.date,
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn is_full(&self) -> bool {
        self.students_attending >= self.max_students
    }

    pub fn ensure_coach(&self, caller: UserId) -> Result<(), BookingError> {
        if self.coach_id != caller {
            return Err(BookingError::Forbidden(format!(
                "occurrence {} belongs to another coach",
                self.id
            )));
        }
        Ok(())
    }

    pub fn ensure_status(
        &self,
        operation: &'static str,
        allowed: &[OccurrenceStatus],
    ) -> Result<(), BookingError> {
        if !allowed.contains(&self.status) {
            return Err(BookingError::InvalidTransition {
                operation,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Checks the occurrence can take one more student.
    ///
    /// A full occurrence reports `CapacityExceeded` even when its status has
    /// already flipped to `confirmed`, so the losing side of a race for the
    /// last seat sees the real reason.
    pub fn ensure_open_seat(&self) -> Result<(), BookingError> {
        if self.status == OccurrenceStatus::Confirmed && self.is_full() {
            return Err(BookingError::CapacityExceeded);
        }
        if !self.status.is_bookable() {
            return Err(BookingError::NotAvailable {
                status: self.status,
            });
        }
        if self.is_full() {
            return Err(BookingError::CapacityExceeded);
        }
        Ok(())
    }

    /// Seats one student and recomputes status from occupancy.
    pub fn take_seat(&mut self) -> Result<(), BookingError> {
        self.ensure_open_seat()?;
        self.students_attending += 1;
        self.status = match self.kind {
            ClassKind::Individual => OccurrenceStatus::Confirmed,
            ClassKind::Group if self.is_full() => OccurrenceStatus::Confirmed,
            ClassKind::Group => OccurrenceStatus::Pubcon,
        };
        Ok(())
    }

    /// Frees one seat after a student cancels.
    pub fn release_seat(&mut self) {
        self.students_attending = (self.students_attending - 1).max(0);
        self.status = match self.kind {
            ClassKind::Group if self.students_attending > 0 => OccurrenceStatus::Pubcon,
            _ => OccurrenceStatus::Published,
        };
    }

    /// Moves the occurrence to a new window and recomputes the derived
    /// pricing figures. The caller decides the resulting status.
    pub fn move_to(&mut self, window: TimeWindow, price: Option<Decimal>, venue: Option<Venue>) {
        if let Some(price) = price {
            self.price = price;
        }
        if let Some(venue) = venue {
            self.venue = venue;
        }
        let pricing = slot_pricing(&window, self.price);
        self.date = window.date;
        self.start_time = window.start;
        self.end_time = window.end;
        self.duration_minutes = pricing.duration_minutes;
        self.price_per_hour = pricing.price_per_hour;
        self.day_of_week = pricing.day_of_week;
    }

    /// The instant after which a pending reschedule resolves as rejected.
    pub fn reschedule_deadline(&self) -> NaiveDateTime {
        self.response_deadline
            .unwrap_or_else(|| self.window().ends_at())
    }
}

// =============================================================================
// SQL persistence
// =============================================================================

impl Occurrence {
    pub async fn find_by_id(id: OccurrenceId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM occurrences WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_group(
        session_group_id: SessionGroupId,
        pool: &PgPool,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM occurrences
             WHERE session_group_id = $1
             ORDER BY session_date ASC, start_time ASC",
        )
        .bind(session_group_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_for_coach_on(
        coach_id: UserId,
        date: NaiveDate,
        pool: &PgPool,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM occurrences
             WHERE coach_id = $1 AND session_date = $2
             ORDER BY start_time ASC",
        )
        .bind(coach_id)
        .bind(date)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_status(status: OccurrenceStatus, pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM occurrences WHERE status = $1 ORDER BY session_date ASC, start_time ASC",
        )
        .bind(status)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO occurrences (
                id, session_group_id, coach_id, activity, session_date, start_time, end_time,
                duration_minutes, day_of_week, venue_address, venue_postal_code, kind,
                recurrence, max_students, students_attending, price, price_per_hour,
                description, status, response_deadline, paid_out, version, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)",
        )
        .bind(self.id)
        .bind(self.session_group_id)
        .bind(self.coach_id)
        .bind(&self.activity)
        .bind(self.date)
        .bind(self.start_time)
        .bind(self.end_time)
        .bind(self.duration_minutes)
        .bind(self.day_of_week)
        .bind(&self.venue.address)
        .bind(&self.venue.postal_code)
        .bind(self.kind)
        .bind(self.recurrence)
        .bind(self.max_students)
        .bind(self.students_attending)
        .bind(self.price)
        .bind(self.price_per_hour)
        .bind(&self.description)
        .bind(self.status)
        .bind(self.response_deadline)
        .bind(self.paid_out)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Writes every mutable column, conditional on the row still being at
    /// `expected_version`. Returns `false` when another writer got there first.
    pub async fn update_versioned(
        &self,
        expected_version: i64,
        conn: &mut PgConnection,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE occurrences SET
                session_date = $3, start_time = $4, end_time = $5, duration_minutes = $6,
                day_of_week = $7, venue_address = $8, venue_postal_code = $9,
                students_attending = $10, price = $11, price_per_hour = $12, status = $13,
                response_deadline = $14, paid_out = $15, version = $16, updated_at = $17
             WHERE id = $1 AND version = $2",
        )
        .bind(self.id)
        .bind(expected_version)
        .bind(self.date)
        .bind(self.start_time)
        .bind(self.end_time)
        .bind(self.duration_minutes)
        .bind(self.day_of_week)
        .bind(&self.venue.address)
        .bind(&self.venue.postal_code)
        .bind(self.students_attending)
        .bind(self.price)
        .bind(self.price_per_hour)
        .bind(self.status)
        .bind(self.response_deadline)
        .bind(self.paid_out)
        .bind(self.version)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Share-locks the row if it is still at `version`.
    pub async fn lock_at_version(
        id: OccurrenceId,
        version: i64,
        conn: &mut PgConnection,
    ) -> sqlx::Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM occurrences WHERE id = $1 AND version = $2 FOR SHARE")
                .bind(id)
                .bind(version)
                .fetch_optional(conn)
                .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn template(kind: ClassKind, max_students: i32) -> OccurrenceTemplate {
        OccurrenceTemplate {
            session_group_id: SessionGroupId::new(),
            coach_id: UserId::new(),
            activity: "yoga".into(),
            venue: Venue::new("5 Park Ave", "10001"),
            kind,
            recurrence: Recurrence::Once,
            max_students,
            price: Decimal::from(30),
            description: String::new(),
        }
    }

    fn occurrence(kind: ClassKind, max_students: i32) -> Occurrence {
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2030, 4, 1, 0, 0, 0).unwrap();
        Occurrence::published(&template(kind, max_students), window, now)
    }

    #[test]
    fn published_occurrence_derives_pricing() {
        let occ = occurrence(ClassKind::Individual, 1);
        assert_eq!(occ.status, OccurrenceStatus::Published);
        assert_eq!(occ.duration_minutes, 90);
        assert_eq!(occ.price_per_hour, Decimal::from(20));
        assert_eq!(occ.day_of_week, 3);
    }

    #[test]
    fn individual_confirms_on_first_seat() {
        let mut occ = occurrence(ClassKind::Individual, 1);
        occ.take_seat().unwrap();
        assert_eq!(occ.status, OccurrenceStatus::Confirmed);
        assert_eq!(occ.students_attending, 1);
        assert_eq!(occ.take_seat(), Err(BookingError::CapacityExceeded));
    }

    #[test]
    fn group_moves_through_pubcon_to_confirmed() {
        let mut occ = occurrence(ClassKind::Group, 3);
        occ.take_seat().unwrap();
        assert_eq!(occ.status, OccurrenceStatus::Pubcon);
        occ.take_seat().unwrap();
        assert_eq!(occ.status, OccurrenceStatus::Pubcon);
        occ.take_seat().unwrap();
        assert_eq!(occ.status, OccurrenceStatus::Confirmed);
        assert_eq!(occ.take_seat(), Err(BookingError::CapacityExceeded));
        assert_eq!(occ.students_attending, 3);
    }

    #[test]
    fn cancelled_occurrence_is_not_available() {
        let mut occ = occurrence(ClassKind::Group, 3);
        occ.status = OccurrenceStatus::Cancelled;
        assert_eq!(
            occ.take_seat(),
            Err(BookingError::NotAvailable {
                status: OccurrenceStatus::Cancelled
            })
        );
    }

    #[test]
    fn releasing_seats_reopens_the_occurrence() {
        let mut occ = occurrence(ClassKind::Group, 2);
        occ.take_seat().unwrap();
        occ.take_seat().unwrap();
        occ.release_seat();
        assert_eq!(occ.status, OccurrenceStatus::Pubcon);
        occ.release_seat();
        assert_eq!(occ.status, OccurrenceStatus::Published);
        occ.release_seat();
        assert_eq!(occ.students_attending, 0);
    }

    #[test]
    fn move_to_recomputes_derived_fields() {
        let mut occ = occurrence(ClassKind::Individual, 1);
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2030, 5, 5).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(14, 45, 0).unwrap(),
        )
        .unwrap();
        occ.move_to(window, Some(Decimal::from(45)), None);
        assert_eq!(occ.window(), window);
        assert_eq!(occ.duration_minutes, 45);
        assert_eq!(occ.price_per_hour, Decimal::from(60));
        assert_eq!(occ.day_of_week, 0);
        assert_eq!(occ.venue.address, "5 Park Ave");
    }
}
