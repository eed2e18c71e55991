use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local, Utc};
use shared::{Availability, Booking, BookingStatus, CapacityAudit};
use tokio::sync::Mutex;

use crate::ledger::{ensure_not_started, release_seat, reserve_seat, LedgerError, StoreError};
use crate::models::*;
use crate::store::SeatStore;

/// Individual writes inside a booking transaction that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    BookingInsert,
    BookingUpdate,
    CapacityUpdate,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    classes: HashMap<i32, FitnessClass>,
    schedules: HashMap<i32, ClassSchedule>,
    bookings: BTreeMap<i32, BookingRow>,
    last_class_id: i32,
    last_schedule_id: i32,
    last_booking_id: i32,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    fault: Option<WriteStep>,
}

/// In-process store for tests and database-less runs.
///
/// One mutex serialises every operation. Writes are staged on a copy of the
/// tables and swapped in only when the whole operation succeeds, so a failed
/// operation leaves nothing behind. Every mutation copies all tables, so this
/// store is not meant for load.
#[derive(Debug, Default)]
pub struct MemorySeatStore {
    inner: Mutex<Inner>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_class(&self, new: NewFitnessClass) -> FitnessClass {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        tables.last_class_id += 1;
        let class = FitnessClass {
            id: tables.last_class_id,
            name: new.name,
            trainer_id: new.trainer_id,
            max_capacity: new.max_capacity,
            is_active: new.is_active,
        };
        tables.classes.insert(class.id, class.clone());
        class
    }

    pub async fn insert_schedule(&self, new: NewClassSchedule) -> ClassSchedule {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        tables.last_schedule_id += 1;
        let schedule = ClassSchedule {
            id: tables.last_schedule_id,
            class_id: new.class_id,
            scheduled_date: new.scheduled_date,
            start_time: new.start_time,
            end_time: new.end_time,
            current_capacity: new.current_capacity,
            status: new.status,
        };
        tables.schedules.insert(schedule.id, schedule.clone());
        schedule
    }

    pub async fn schedule(&self, schedule_id: i32) -> Option<ClassSchedule> {
        self.inner.lock().await.tables.schedules.get(&schedule_id).cloned()
    }

    pub async fn booking(&self, booking_id: i32) -> Option<BookingRow> {
        self.inner.lock().await.tables.bookings.get(&booking_id).cloned()
    }

    pub async fn bookings_for(&self, schedule_id: i32) -> Vec<BookingRow> {
        self.inner
            .lock()
            .await
            .tables
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id)
            .cloned()
            .collect()
    }

    /// Makes the next write of the given kind fail with a store error.
    pub async fn fail_next(&self, step: WriteStep) {
        self.inner.lock().await.fault = Some(step);
    }

    async fn transact<T>(
        &self,
        op: impl FnOnce(&mut Tables, &mut Option<WriteStep>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut inner = self.inner.lock().await;
        let Inner { tables, fault } = &mut *inner;
        let mut staged = tables.clone();
        let value = op(&mut staged, fault)?;
        *tables = staged;
        Ok(value)
    }
}

fn write(fault: &mut Option<WriteStep>, step: WriteStep) -> Result<(), StoreError> {
    if *fault == Some(step) {
        *fault = None;
        return Err(StoreError::Unavailable(format!("{:?} failed", step)));
    }
    Ok(())
}

impl Tables {
    fn max_capacity(&self, schedule: &ClassSchedule) -> Result<i32, StoreError> {
        self.classes
            .get(&schedule.class_id)
            .map(|class| class.max_capacity)
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "schedule {} references missing class {}",
                    schedule.id, schedule.class_id
                ))
            })
    }

    fn schedule_mut(&mut self, schedule_id: i32) -> Result<&mut ClassSchedule, StoreError> {
        self.schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| StoreError::Corrupt(format!("schedule {} vanished", schedule_id)))
    }
}

impl SeatStore for MemorySeatStore {
    async fn book(
        &self,
        schedule_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> Result<Booking, LedgerError> {
        let booked_at = now.with_timezone(&Utc);

        let row = self
            .transact(|tables, fault| {
                let schedule = tables
                    .schedules
                    .get(&schedule_id)
                    .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;
                let seats = reserve_seat(schedule, tables.max_capacity(schedule)?)?;

                let already_booked = tables
                    .bookings
                    .values()
                    .any(|b| b.schedule_id == schedule_id && b.user_id == user_id);
                if already_booked {
                    return Err(LedgerError::AlreadyBooked {
                        schedule_id,
                        user_id,
                    });
                }

                write(fault, WriteStep::BookingInsert)?;
                let new = NewBooking::confirmed(schedule_id, user_id, booked_at);
                tables.last_booking_id += 1;
                let row = BookingRow {
                    id: tables.last_booking_id,
                    schedule_id: new.schedule_id,
                    user_id: new.user_id,
                    booking_status: new.booking_status,
                    booked_at: new.booked_at,
                    cancelled_at: None,
                };
                tables.bookings.insert(row.id, row.clone());

                write(fault, WriteStep::CapacityUpdate)?;
                tables.schedule_mut(schedule_id)?.current_capacity = seats.current();

                Ok(row)
            })
            .await?;

        Ok(Booking::try_from(row)?)
    }

    async fn cancel(
        &self,
        booking_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> Result<Booking, LedgerError> {
        let cancelled_at = now.with_timezone(&Utc);

        let row = self
            .transact(|tables, fault| {
                let booking = tables
                    .bookings
                    .get(&booking_id)
                    .filter(|b| {
                        b.user_id == user_id
                            && b.booking_status == BookingStatus::Confirmed.as_str()
                    })
                    .ok_or(LedgerError::BookingNotFound { booking_id })?;
                let schedule = tables
                    .schedules
                    .get(&booking.schedule_id)
                    .ok_or(LedgerError::BookingNotFound { booking_id })?;

                ensure_not_started(booking_id, schedule.starts_at(), now.naive_local())?;
                let schedule_id = schedule.id;

                write(fault, WriteStep::BookingUpdate)?;
                let row = match tables.bookings.get_mut(&booking_id) {
                    Some(row) => {
                        row.booking_status = BookingStatus::Cancelled.as_str().to_string();
                        row.cancelled_at = Some(cancelled_at);
                        row.clone()
                    }
                    None => return Err(LedgerError::BookingNotFound { booking_id }),
                };

                write(fault, WriteStep::CapacityUpdate)?;
                let schedule = tables.schedule_mut(schedule_id)?;
                schedule.current_capacity = release_seat(schedule.current_capacity);

                Ok(row)
            })
            .await?;

        Ok(Booking::try_from(row)?)
    }

    async fn availability(&self, schedule_id: i32) -> Result<Availability, LedgerError> {
        let inner = self.inner.lock().await;
        let schedule = inner
            .tables
            .schedules
            .get(&schedule_id)
            .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;
        let max_capacity = inner.tables.max_capacity(schedule)?;
        Ok(schedule.availability(max_capacity)?)
    }

    async fn audit(&self, schedule_id: i32) -> Result<CapacityAudit, LedgerError> {
        let inner = self.inner.lock().await;
        let schedule = inner
            .tables
            .schedules
            .get(&schedule_id)
            .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;
        let confirmed = inner
            .tables
            .bookings
            .values()
            .filter(|b| {
                b.schedule_id == schedule_id
                    && b.booking_status == BookingStatus::Confirmed.as_str()
            })
            .count();
        let confirmed = i32::try_from(confirmed).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(CapacityAudit::new(
            schedule_id,
            schedule.current_capacity,
            confirmed,
        ))
    }
}
