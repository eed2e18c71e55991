use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use shared::{Availability, Booking, BookingStatus, ScheduleStatus};

use crate::ledger::{SeatCount, StoreError};

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::fitness_classes)]
pub struct FitnessClass {
    pub id: i32,
    pub name: String,
    pub trainer_id: Option<i32>,
    pub max_capacity: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::fitness_classes)]
pub struct NewFitnessClass {
    pub name: String,
    pub trainer_id: Option<i32>,
    pub max_capacity: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::class_schedules)]
pub struct ClassSchedule {
    pub id: i32,
    pub class_id: i32,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub current_capacity: i32,
    pub status: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::class_schedules)]
pub struct NewClassSchedule {
    pub class_id: i32,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub current_capacity: i32,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::class_bookings)]
pub struct BookingRow {
    pub id: i32,
    pub schedule_id: i32,
    pub user_id: i32,
    pub booking_status: String,
    pub booked_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::class_bookings)]
pub struct NewBooking {
    pub schedule_id: i32,
    pub user_id: i32,
    pub booking_status: String,
    pub booked_at: DateTime<Utc>,
}

impl NewBooking {
    pub fn confirmed(schedule_id: i32, user_id: i32, booked_at: DateTime<Utc>) -> Self {
        Self {
            schedule_id,
            user_id,
            booking_status: BookingStatus::Confirmed.as_str().to_string(),
            booked_at,
        }
    }
}

impl ClassSchedule {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.start_time)
    }

    pub fn is_open(&self) -> bool {
        self.status == ScheduleStatus::Scheduled.as_str()
    }

    pub fn seats(&self, max_capacity: i32) -> SeatCount {
        SeatCount::new(self.current_capacity, max_capacity)
    }

    pub fn availability(&self, max_capacity: i32) -> Result<Availability, StoreError> {
        let status = self
            .status
            .parse::<ScheduleStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Availability {
            schedule_id: self.id,
            class_id: self.class_id,
            scheduled_date: self.scheduled_date,
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            current_capacity: self.current_capacity,
            max_capacity,
            available_seats: self.seats(max_capacity).available(),
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let booking_status = row
            .booking_status
            .parse::<BookingStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Self {
            id: row.id,
            schedule_id: row.schedule_id,
            user_id: row.user_id,
            booking_status,
            booked_at: row.booked_at,
            cancelled_at: row.cancelled_at,
        })
    }
}
