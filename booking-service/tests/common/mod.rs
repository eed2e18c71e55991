#![allow(dead_code)]

use booking_service::models::{ClassSchedule, NewClassSchedule, NewFitnessClass};
use booking_service::MemorySeatStore;
use chrono::{Duration, Local, NaiveDateTime};
use shared::ScheduleStatus;

pub fn new_class(max_capacity: i32) -> NewFitnessClass {
    NewFitnessClass {
        name: "Morning HIIT".to_string(),
        trainer_id: Some(42),
        max_capacity,
        is_active: true,
    }
}

pub fn new_schedule(class_id: i32, starts_at: NaiveDateTime) -> NewClassSchedule {
    NewClassSchedule {
        class_id,
        scheduled_date: starts_at.date(),
        start_time: starts_at.time(),
        end_time: (starts_at + Duration::hours(1)).time(),
        current_capacity: 0,
        status: ScheduleStatus::Scheduled.as_str().to_string(),
    }
}

pub fn next_week() -> NaiveDateTime {
    Local::now().naive_local() + Duration::days(7)
}

pub fn last_week() -> NaiveDateTime {
    Local::now().naive_local() - Duration::days(7)
}

/// Seeds one class with `max_capacity` seats and one upcoming schedule for it.
pub async fn seeded_store(max_capacity: i32) -> (MemorySeatStore, ClassSchedule) {
    let store = MemorySeatStore::new();
    let class = store.insert_class(new_class(max_capacity)).await;
    let schedule = store.insert_schedule(new_schedule(class.id, next_week())).await;
    (store, schedule)
}
