//! Seat accounting for class schedules.
//!
//! [`BookingLedger`] is the entry point used by the HTTP layer. The atomic
//! read-check-write sequences live in the [`SeatStore`] implementations; the
//! rules they apply (capacity, duplicate bookings, the past-class guard) are
//! defined here so every store enforces them identically.

use chrono::{DateTime, Local, NaiveDateTime};
use diesel_async::pooled_connection::PoolError;
use shared::{Availability, Booking, CapacityAudit};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::ClassSchedule;
use crate::store::SeatStore;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Full,
    AlreadyBooked,
    PastClass,
    Store,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Class schedule not found or not open for booking")]
    ScheduleNotFound { schedule_id: i32 },

    #[error("Booking not found or already cancelled")]
    BookingNotFound { booking_id: i32 },

    #[error("Class is full")]
    Full { schedule_id: i32 },

    #[error("You have already booked this class")]
    AlreadyBooked { schedule_id: i32, user_id: i32 },

    #[error("Cannot cancel past classes")]
    PastClass { booking_id: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ScheduleNotFound { .. } | LedgerError::BookingNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::Full { .. } => ErrorKind::Full,
            LedgerError::AlreadyBooked { .. } => ErrorKind::AlreadyBooked,
            LedgerError::PastClass { .. } => ErrorKind::PastClass,
            LedgerError::Store(_) => ErrorKind::Store,
        }
    }
}

// diesel-async transactions require the closure error to absorb query errors.
impl From<diesel::result::Error> for LedgerError {
    fn from(err: diesel::result::Error) -> Self {
        LedgerError::Store(StoreError::Query(err))
    }
}

/// Confirmed bookings against the class maximum for one schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatCount {
    current: i32,
    max: i32,
}

impl SeatCount {
    pub fn new(current: i32, max: i32) -> Self {
        Self { current, max }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn has_room(&self) -> bool {
        self.current < self.max
    }

    /// Takes one seat, or `None` when the schedule is already at its maximum.
    pub fn reserve(self) -> Option<SeatCount> {
        self.has_room().then(|| SeatCount {
            current: self.current + 1,
            ..self
        })
    }

    /// Gives one seat back. Never goes below zero.
    pub fn release(self) -> SeatCount {
        SeatCount {
            current: release_seat(self.current),
            ..self
        }
    }

    pub fn available(&self) -> i32 {
        (self.max - self.current).max(0)
    }
}

pub fn release_seat(current: i32) -> i32 {
    (current - 1).max(0)
}

/// Capacity and status checks for `book`, in the order callers observe them.
pub(crate) fn reserve_seat(
    schedule: &ClassSchedule,
    max_capacity: i32,
) -> Result<SeatCount, LedgerError> {
    if !schedule.is_open() {
        return Err(LedgerError::ScheduleNotFound {
            schedule_id: schedule.id,
        });
    }
    schedule
        .seats(max_capacity)
        .reserve()
        .ok_or(LedgerError::Full {
            schedule_id: schedule.id,
        })
}

pub(crate) fn ensure_not_started(
    booking_id: i32,
    starts_at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(), LedgerError> {
    if starts_at < now {
        return Err(LedgerError::PastClass { booking_id });
    }
    Ok(())
}

pub struct BookingLedger<S> {
    store: S,
}

impl<S: SeatStore> BookingLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn book(&self, schedule_id: i32, user_id: i32) -> Result<Booking, LedgerError> {
        self.book_at(schedule_id, user_id, Local::now()).await
    }

    pub async fn book_at(
        &self,
        schedule_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> Result<Booking, LedgerError> {
        let result = self.store.book(schedule_id, user_id, now).await;
        match &result {
            Ok(booking) => info!(
                "Booking {} confirmed for user {} on schedule {}",
                booking.id, user_id, schedule_id
            ),
            Err(e) => log_failure("book", e),
        }
        result
    }

    pub async fn cancel(&self, booking_id: i32, user_id: i32) -> Result<Booking, LedgerError> {
        self.cancel_at(booking_id, user_id, Local::now()).await
    }

    pub async fn cancel_at(
        &self,
        booking_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> Result<Booking, LedgerError> {
        let result = self.store.cancel(booking_id, user_id, now).await;
        match &result {
            Ok(booking) => info!(
                "Booking {} cancelled by user {} on schedule {}",
                booking.id, user_id, booking.schedule_id
            ),
            Err(e) => log_failure("cancel", e),
        }
        result
    }

    pub async fn availability(&self, schedule_id: i32) -> Result<Availability, LedgerError> {
        let result = self.store.availability(schedule_id).await;
        if let Err(e) = &result {
            log_failure("availability", e);
        }
        result
    }

    pub async fn audit(&self, schedule_id: i32) -> Result<CapacityAudit, LedgerError> {
        let result = self.store.audit(schedule_id).await;
        match &result {
            Ok(audit) if !audit.consistent => warn!(
                "Capacity drift on schedule {}: recorded {}, confirmed {}",
                schedule_id, audit.recorded_capacity, audit.confirmed_bookings
            ),
            Ok(_) => {}
            Err(e) => log_failure("audit", e),
        }
        result
    }
}

fn log_failure(operation: &str, err: &LedgerError) {
    match err.kind() {
        ErrorKind::Store => error!("{} failed, transaction rolled back: {}", operation, err),
        _ => info!("{} rejected: {:?}", operation, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use shared::ScheduleStatus;

    fn schedule(current_capacity: i32, status: ScheduleStatus) -> ClassSchedule {
        ClassSchedule {
            id: 4,
            class_id: 1,
            scheduled_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            current_capacity,
            status: status.as_str().to_string(),
        }
    }

    #[test]
    fn reserve_stops_at_max() {
        let seats = SeatCount::new(1, 2);
        let seats = seats.reserve().unwrap();
        assert_eq!(seats.current(), 2);
        assert_eq!(seats.available(), 0);
        assert!(seats.reserve().is_none());
    }

    #[test]
    fn release_floors_at_zero() {
        assert_eq!(SeatCount::new(2, 5).release().current(), 1);
        assert_eq!(SeatCount::new(0, 5).release().current(), 0);
        assert_eq!(release_seat(-3), 0);
    }

    #[test]
    fn zero_capacity_class_is_always_full() {
        assert!(!SeatCount::new(0, 0).has_room());
        assert_eq!(SeatCount::new(0, 0).available(), 0);
    }

    #[test]
    fn cancelled_schedule_reads_as_not_found() {
        let err = reserve_seat(&schedule(0, ScheduleStatus::Cancelled), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn full_schedule_rejects_before_duplicate_check() {
        let err = reserve_seat(&schedule(10, ScheduleStatus::Scheduled), 10).unwrap_err();
        assert!(matches!(err, LedgerError::Full { schedule_id: 4 }));
        assert_eq!(
            reserve_seat(&schedule(9, ScheduleStatus::Scheduled), 10)
                .unwrap()
                .current(),
            10
        );
    }

    #[test]
    fn class_starting_now_can_still_be_cancelled() {
        let starts_at = schedule(1, ScheduleStatus::Scheduled).starts_at();
        assert!(ensure_not_started(1, starts_at, starts_at).is_ok());

        let later = starts_at + chrono::Duration::seconds(1);
        let err = ensure_not_started(1, starts_at, later).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PastClass);
    }

    #[test]
    fn store_errors_keep_their_source_message() {
        let err = LedgerError::from(StoreError::Unavailable("disk gone".into()));
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "store unavailable: disk gone");

        let err = LedgerError::from(diesel::result::Error::NotFound);
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
