pub mod database;
pub mod error;
pub mod handle;
pub mod schema;

pub use database::{MeterDatabase, QuotaWindowRow};
pub use error::StorageError;
pub use handle::{StoreHandle, StoreUnavailable};

pub const METER_DB_FILENAME: &str = "meter.db";
