//! Transactional backends for the booking ledger.
//!
//! Every mutating method is a single atomic unit: either all of its writes
//! become visible or none do.

mod memory;
mod postgres;

use std::future::Future;

use chrono::{DateTime, Local};
use shared::{Availability, Booking, CapacityAudit};

use crate::ledger::LedgerError;

pub use memory::{MemorySeatStore, WriteStep};
pub use postgres::{DbPool, PgSeatStore};

pub trait SeatStore: Send + Sync + 'static {
    /// Reserves one seat on `schedule_id` for `user_id`.
    fn book(
        &self,
        schedule_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> impl Future<Output = Result<Booking, LedgerError>> + Send;

    /// Cancels a confirmed booking owned by `user_id` and releases its seat.
    fn cancel(
        &self,
        booking_id: i32,
        user_id: i32,
        now: DateTime<Local>,
    ) -> impl Future<Output = Result<Booking, LedgerError>> + Send;

    fn availability(
        &self,
        schedule_id: i32,
    ) -> impl Future<Output = Result<Availability, LedgerError>> + Send;

    fn audit(
        &self,
        schedule_id: i32,
    ) -> impl Future<Output = Result<CapacityAudit, LedgerError>> + Send;
}
