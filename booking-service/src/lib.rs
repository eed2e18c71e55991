pub mod api;
pub mod error;
pub mod ledger;
pub mod models;
pub mod schema;
pub mod store;

pub use ledger::{BookingLedger, ErrorKind, LedgerError, SeatCount, StoreError};
pub use store::{MemorySeatStore, PgSeatStore, SeatStore, WriteStep};
