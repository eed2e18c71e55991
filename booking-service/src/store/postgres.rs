use chrono::{DateTime, Local, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::{Availability, Booking, BookingStatus, CapacityAudit};

use crate::ledger::{ensure_not_started, release_seat, reserve_seat, LedgerError, StoreError};
use crate::models::*;
use crate::schema::*;
use crate::store::SeatStore;

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// PostgreSQL-backed store. Each mutation runs in its own transaction and
/// takes a row lock on the schedule before reading its capacity.
#[derive(Clone)]
pub struct PgSeatStore {
    pool: DbPool,
    statement_timeout_ms: u64,
}

impl PgSeatStore {
    pub fn new(pool: DbPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

async fn set_statement_timeout(conn: &mut AsyncPgConnection, timeout_ms: u64) -> QueryResult<()> {
    diesel::sql_query(format!("SET LOCAL statement_timeout = {}", timeout_ms))
        .execute(conn)
        .await?;
    Ok(())
}

impl SeatStore for PgSeatStore {
    async fn book(
        &self,
        schedule_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> Result<Booking, LedgerError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let timeout_ms = self.statement_timeout_ms;
        let booked_at = now.with_timezone(&Utc);

        let row = conn
            .transaction::<_, LedgerError, _>(|conn| {
                Box::pin(async move {
                    set_statement_timeout(conn, timeout_ms).await?;

                    let schedule = class_schedules::table
                        .find(schedule_id)
                        .for_update()
                        .first::<ClassSchedule>(conn)
                        .await
                        .optional()?
                        .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;

                    let max_capacity = fitness_classes::table
                        .find(schedule.class_id)
                        .select(fitness_classes::max_capacity)
                        .first::<i32>(conn)
                        .await?;

                    let seats = reserve_seat(&schedule, max_capacity)?;

                    let already_booked = diesel::select(exists(
                        class_bookings::table
                            .filter(class_bookings::schedule_id.eq(schedule_id))
                            .filter(class_bookings::user_id.eq(user_id)),
                    ))
                    .get_result::<bool>(conn)
                    .await?;

                    if already_booked {
                        return Err(LedgerError::AlreadyBooked {
                            schedule_id,
                            user_id,
                        });
                    }

                    let row = diesel::insert_into(class_bookings::table)
                        .values(&NewBooking::confirmed(schedule_id, user_id, booked_at))
                        .get_result::<BookingRow>(conn)
                        .await?;

                    diesel::update(class_schedules::table.find(schedule_id))
                        .set(class_schedules::current_capacity.eq(seats.current()))
                        .execute(conn)
                        .await?;

                    Ok(row)
                })
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
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let timeout_ms = self.statement_timeout_ms;
        let cancelled_at = now.with_timezone(&Utc);

        let row = conn
            .transaction::<_, LedgerError, _>(|conn| {
                Box::pin(async move {
                    set_statement_timeout(conn, timeout_ms).await?;

                    let (booking, schedule) = class_bookings::table
                        .inner_join(class_schedules::table)
                        .filter(class_bookings::id.eq(booking_id))
                        .filter(class_bookings::user_id.eq(user_id))
                        .filter(class_bookings::booking_status.eq(BookingStatus::Confirmed.as_str()))
                        .select((class_bookings::all_columns, class_schedules::all_columns))
                        .for_update()
                        .first::<(BookingRow, ClassSchedule)>(conn)
                        .await
                        .optional()?
                        .ok_or(LedgerError::BookingNotFound { booking_id })?;

                    ensure_not_started(booking.id, schedule.starts_at(), now.naive_local())?;

                    let row = diesel::update(class_bookings::table.find(booking.id))
                        .set((
                            class_bookings::booking_status.eq(BookingStatus::Cancelled.as_str()),
                            class_bookings::cancelled_at.eq(Some(cancelled_at)),
                        ))
                        .get_result::<BookingRow>(conn)
                        .await?;

                    diesel::update(class_schedules::table.find(schedule.id))
                        .set(
                            class_schedules::current_capacity
                                .eq(release_seat(schedule.current_capacity)),
                        )
                        .execute(conn)
                        .await?;

                    Ok(row)
                })
            })
            .await?;

        Ok(Booking::try_from(row)?)
    }

    async fn availability(&self, schedule_id: i32) -> Result<Availability, LedgerError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;

        let (schedule, max_capacity) = class_schedules::table
            .inner_join(fitness_classes::table)
            .filter(class_schedules::id.eq(schedule_id))
            .select((class_schedules::all_columns, fitness_classes::max_capacity))
            .first::<(ClassSchedule, i32)>(&mut conn)
            .await
            .optional()?
            .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;

        Ok(schedule.availability(max_capacity)?)
    }

    async fn audit(&self, schedule_id: i32) -> Result<CapacityAudit, LedgerError> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;

        let (recorded, confirmed) = conn
            .transaction::<_, LedgerError, _>(|conn| {
                Box::pin(async move {
                    // Both counts must come from one snapshot.
                    diesel::sql_query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                        .execute(conn)
                        .await?;

                    let recorded = class_schedules::table
                        .find(schedule_id)
                        .select(class_schedules::current_capacity)
                        .first::<i32>(conn)
                        .await
                        .optional()?
                        .ok_or(LedgerError::ScheduleNotFound { schedule_id })?;

                    let confirmed = class_bookings::table
                        .filter(class_bookings::schedule_id.eq(schedule_id))
                        .filter(class_bookings::booking_status.eq(BookingStatus::Confirmed.as_str()))
                        .count()
                        .get_result::<i64>(conn)
                        .await?;

                    Ok((recorded, confirmed))
                })
            })
            .await?;

        let confirmed = i32::try_from(confirmed).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(CapacityAudit::new(schedule_id, recorded, confirmed))
    }
}
